use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use shoelink_frame::ChannelName;
use shoelink_peer::{ChannelConfig, Coordinator};
use shoelink_transport::Transport;
use tracing::debug;

use crate::cmd::DeviceArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};

/// Where a shoe is reachable: `unix:PATH` or `serial:PATH[@BAUD]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    Unix(PathBuf),
    Serial {
        path: PathBuf,
        baud_rate: Option<u32>,
    },
}

impl FromStr for DeviceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("'{s}': expected unix:PATH or serial:PATH[@BAUD]"))?;
        if rest.is_empty() {
            return Err(format!("'{s}': device path is empty"));
        }
        match scheme {
            "unix" => Ok(DeviceSpec::Unix(PathBuf::from(rest))),
            "serial" => match rest.rsplit_once('@') {
                Some((path, baud)) if !path.is_empty() => {
                    let baud_rate = baud
                        .parse()
                        .map_err(|_| format!("'{s}': invalid baud rate '{baud}'"))?;
                    Ok(DeviceSpec::Serial {
                        path: PathBuf::from(path),
                        baud_rate: Some(baud_rate),
                    })
                }
                Some(_) => Err(format!("'{s}': device path is empty")),
                None => Ok(DeviceSpec::Serial {
                    path: PathBuf::from(rest),
                    baud_rate: None,
                }),
            },
            other => Err(format!(
                "'{s}': unknown device kind '{other}' (expected unix or serial)"
            )),
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Unix(path) => write!(f, "unix:{}", path.display()),
            DeviceSpec::Serial {
                path,
                baud_rate: Some(baud),
            } => write!(f, "serial:{}@{baud}", path.display()),
            DeviceSpec::Serial { path, .. } => write!(f, "serial:{}", path.display()),
        }
    }
}

impl DeviceSpec {
    /// Channel behavior when no config file is given. Serial firmware reads
    /// newline-terminated lines; socket bridges forward bytes unchanged.
    pub fn default_config(&self) -> ChannelConfig {
        match self {
            DeviceSpec::Unix(_) => ChannelConfig::default(),
            DeviceSpec::Serial { .. } => ChannelConfig::serial(),
        }
    }

    pub fn transport(&self) -> CliResult<Arc<dyn Transport>> {
        match self {
            #[cfg(unix)]
            DeviceSpec::Unix(path) => Ok(Arc::new(shoelink_transport::UnixSocketTransport::new(
                path,
            ))),
            #[cfg(not(unix))]
            DeviceSpec::Unix(_) => Err(CliError::new(
                crate::exit::UNAVAILABLE,
                format!("{self}: Unix sockets are not supported on this platform"),
            )),
            #[cfg(feature = "serial")]
            DeviceSpec::Serial { path, baud_rate } => {
                let mut settings = shoelink_transport::SerialSettings::new(path);
                if let Some(baud) = baud_rate {
                    settings.baud_rate = *baud;
                }
                Ok(Arc::new(shoelink_transport::SerialTransport::new(settings)))
            }
            #[cfg(not(feature = "serial"))]
            DeviceSpec::Serial { .. } => Err(CliError::new(
                crate::exit::UNAVAILABLE,
                format!("{self}: built without serial support (enable the `serial` feature)"),
            )),
        }
    }
}

pub fn load_config(path: &Path) -> CliResult<ChannelConfig> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("{} is not a valid channel config: {err}", path.display()),
        )
    })
}

/// Build the coordinator for the devices named on the command line.
///
/// Must run inside the Tokio runtime.
pub fn build_coordinator(args: &DeviceArgs) -> CliResult<Coordinator> {
    let file_config = args.config.as_deref().map(load_config).transpose()?;

    let devices: Vec<(ChannelName, &DeviceSpec)> = match &args.device {
        Some(spec) => vec![(ChannelName::single(), spec)],
        None => [
            (ChannelName::left(), args.left.as_ref()),
            (ChannelName::right(), args.right.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, spec)| spec.map(|spec| (name, spec)))
        .collect(),
    };
    if devices.is_empty() {
        return Err(CliError::new(
            USAGE,
            "no device given; pass --device SPEC or --left/--right SPEC",
        ));
    }

    let coordinator = Coordinator::new(file_config.clone().unwrap_or_default());
    for (name, spec) in devices {
        let config = file_config
            .clone()
            .unwrap_or_else(|| spec.default_config());
        debug!(channel = %name, device = %spec, "configuring channel");
        coordinator.add_channel_with_config(name, spec.transport()?, config);
    }
    Ok(coordinator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_spec() {
        assert_eq!(
            "unix:/tmp/shoe.sock".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Unix(PathBuf::from("/tmp/shoe.sock"))
        );
    }

    #[test]
    fn parses_serial_spec_with_and_without_baud() {
        assert_eq!(
            "serial:/dev/ttyACM0".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Serial {
                path: PathBuf::from("/dev/ttyACM0"),
                baud_rate: None
            }
        );
        assert_eq!(
            "serial:/dev/ttyUSB0@9600".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Serial {
                path: PathBuf::from("/dev/ttyUSB0"),
                baud_rate: Some(9600)
            }
        );
    }

    #[test]
    fn rejects_bad_specs() {
        assert!("/tmp/shoe.sock".parse::<DeviceSpec>().is_err());
        assert!("unix:".parse::<DeviceSpec>().is_err());
        assert!("ble:Neely".parse::<DeviceSpec>().is_err());
        assert!("serial:/dev/ttyACM0@fast".parse::<DeviceSpec>().is_err());
        assert!("serial:@9600".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for spec in ["unix:/tmp/a.sock", "serial:/dev/ttyACM0", "serial:/dev/ttyACM0@57600"] {
            assert_eq!(spec.parse::<DeviceSpec>().unwrap().to_string(), spec);
        }
    }

    #[test]
    fn serial_devices_terminate_commands() {
        let spec: DeviceSpec = "serial:/dev/ttyACM0".parse().unwrap();
        assert!(spec.default_config().append_newline);
        let spec: DeviceSpec = "unix:/tmp/a.sock".parse().unwrap();
        assert!(!spec.default_config().append_newline);
    }

    #[test]
    fn config_file_is_parsed() {
        let path =
            std::env::temp_dir().join(format!("shoelink-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"write_settle_ms": 5, "append_newline": true}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.write_settle_ms, 5);
        assert!(config.append_newline);

        fs::write(&path, "not json").unwrap();
        assert_eq!(load_config(&path).unwrap_err().code, DATA_INVALID);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn requires_a_device() {
        let err = build_coordinator(&DeviceArgs::default()).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dual_devices_become_left_and_right() {
        let args = DeviceArgs {
            left: Some("unix:/tmp/left.sock".parse().unwrap()),
            right: Some("unix:/tmp/right.sock".parse().unwrap()),
            ..DeviceArgs::default()
        };
        let coordinator = build_coordinator(&args).unwrap();
        assert_eq!(
            coordinator.channel_names(),
            vec![ChannelName::left(), ChannelName::right()]
        );
    }
}
