use crate::config::AppConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    url: Option<String>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --width/--height/--vsync/--url with values.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => {
                    overrides.vsync = Some(parse_bool_flag("vsync", &value)?);
                }
                "url" => {
                    if !value.starts_with("ws://") && !value.starts_with("wss://") {
                        bail!("Invalid url '{value}': expected a ws:// or wss:// address");
                    }
                    overrides.url = Some(value);
                }
                _ => bail!("Unknown flag '{flag}'. Supported flags: --width, --height, --vsync, --url."),
            }
        }
        Ok(overrides)
    }

    pub fn into_config_overrides(self) -> AppConfigOverrides {
        AppConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.vsync,
            url: self.url,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => bail!("Invalid {flag} value '{value}'. Use on/off."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_flag() {
        let overrides = CliOverrides::parse([
            "wareview", "--width", "1920", "--height", "1080", "--vsync", "off", "--url",
            "ws://10.1.2.3:9002",
        ])
        .expect("parse");
        let config = overrides.into_config_overrides();
        assert_eq!(config.width, Some(1920));
        assert_eq!(config.height, Some(1080));
        assert_eq!(config.vsync, Some(false));
        assert_eq!(config.url.as_deref(), Some("ws://10.1.2.3:9002"));
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        assert!(CliOverrides::parse(["wareview", "--widht", "10"]).is_err());
        assert!(CliOverrides::parse(["wareview", "--width", "abc"]).is_err());
        assert!(CliOverrides::parse(["wareview", "--vsync", "maybe"]).is_err());
        assert!(CliOverrides::parse(["wareview", "--url", "http://nope"]).is_err());
        assert!(CliOverrides::parse(["wareview", "--width"]).is_err());
    }

    #[test]
    fn empty_args_mean_no_overrides() {
        let overrides = CliOverrides::parse(["wareview"]).expect("parse");
        assert_eq!(overrides, CliOverrides::default());
        assert!(overrides.into_config_overrides().is_empty());
    }
}
