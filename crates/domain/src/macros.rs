//! Macro for implementing Display and FromStr for status enums
//!
//! Ledger rows persist statuses as lowercase text, so every status enum needs
//! the same pair of conversions. The macro keeps the string table in one
//! place per enum.
//!
//! # Example
//!
//! ```rust
//! use relaypost_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum UploadState {
//!     Queued,
//!     Sent,
//! }
//!
//! impl_domain_status_conversions!(UploadState {
//!     Queued => "queued",
//!     Sent => "sent",
//! });
//!
//! assert_eq!(UploadState::Sent.to_string(), "sent");
//! assert_eq!("QUEUED".parse::<UploadState>().unwrap(), UploadState::Queued);
//! ```

/// Implements Display and FromStr traits for status enums
///
/// Parsing is case-insensitive; output is always the mapped lowercase string.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical string form used for persistence.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => ::std::result::Result::Ok(Self::$variant),)+
                    _ => ::std::result::Result::Err(::std::format!(
                        "Invalid {}: {}",
                        stringify!($enum_name),
                        s
                    )),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ProbeState {
        Unknown,
        Reachable,
        Unreachable,
    }

    impl_domain_status_conversions!(ProbeState {
        Unknown => "unknown",
        Reachable => "reachable",
        Unreachable => "unreachable",
    });

    #[test]
    fn display_uses_mapped_string() {
        assert_eq!(ProbeState::Unknown.to_string(), "unknown");
        assert_eq!(ProbeState::Unreachable.as_str(), "unreachable");
    }

    #[test]
    fn parsing_ignores_case() {
        assert_eq!(ProbeState::from_str("REACHABLE").unwrap(), ProbeState::Reachable);
        assert_eq!(ProbeState::from_str("UnReachable").unwrap(), ProbeState::Unreachable);
    }

    #[test]
    fn parsing_rejects_unknown_values() {
        let err = ProbeState::from_str("maybe").unwrap_err();
        assert!(err.contains("Invalid ProbeState: maybe"));
        assert!(ProbeState::from_str("").is_err());
    }

    /// Validates the macro expands next to the crate's one-parameter alias.
    ///
    /// Assertions:
    /// - `FromStr` still resolves with `crate::errors::Result` in scope
    /// - parsing and display round through the mapped string
    mod with_result_alias {
        #[allow(unused_imports)]
        use crate::errors::Result;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Phase {
            Draft,
            Live,
        }

        impl_domain_status_conversions!(Phase {
            Draft => "draft",
            Live => "live",
        });

        #[test]
        fn expands_alongside_domain_result_alias() {
            assert_eq!("LIVE".parse::<Phase>(), Ok(Phase::Live));
            assert_eq!(Phase::Draft.to_string(), "draft");
        }
    }
}
