//! Output channel kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Category an output line was classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Error,
    Warning,
    Verbose,
    Debug,
    Information,
    Output,
    Stderr,
}

impl ChannelKind {
    /// Every channel, in display order
    pub const ALL: [ChannelKind; 7] = [
        Self::Error,
        Self::Warning,
        Self::Verbose,
        Self::Debug,
        Self::Information,
        Self::Output,
        Self::Stderr,
    ];

    /// Canonical name, as used in persisted documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Verbose => "Verbose",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Output => "Output",
            Self::Stderr => "Stderr",
        }
    }

    /// Heading used in summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "Errors",
            Self::Warning => "Warnings",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" | "errors" => Ok(Self::Error),
            "warning" | "warnings" => Ok(Self::Warning),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            "information" | "info" => Ok(Self::Information),
            "output" => Ok(Self::Output),
            "stderr" => Ok(Self::Stderr),
            _ => Err(Error::ChannelUnknown(s.to_string())),
        }
    }
}

/// Parse a list of channel names, rejecting the whole list on the first unknown name
pub fn parse_channels<S: AsRef<str>>(names: &[S]) -> crate::Result<Vec<ChannelKind>> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_from_str() {
        assert_eq!("Error".parse::<ChannelKind>().unwrap(), ChannelKind::Error);
        assert_eq!("warnings".parse::<ChannelKind>().unwrap(), ChannelKind::Warning);
        assert_eq!(" OUTPUT ".parse::<ChannelKind>().unwrap(), ChannelKind::Output);
        assert_eq!("info".parse::<ChannelKind>().unwrap(), ChannelKind::Information);
        assert!(matches!(
            "stdout".parse::<ChannelKind>(),
            Err(Error::ChannelUnknown(_))
        ));
    }

    #[test]
    fn test_parse_channels_rejects_unknown() {
        let parsed = parse_channels(&["Error", "Warning"]).unwrap();
        assert_eq!(parsed, vec![ChannelKind::Error, ChannelKind::Warning]);
        assert!(parse_channels(&["Error", "bogus"]).is_err());
    }

    #[test]
    fn test_channel_serializes_by_name() {
        let json = serde_json::to_string(&ChannelKind::Information).unwrap();
        assert_eq!(json, "\"Information\"");
    }
}
