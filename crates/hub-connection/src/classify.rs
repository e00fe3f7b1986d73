//! Classification of transport errors into operator-facing categories.

use plcwatch_protocol::{ConnectFailure, FailureCategory, TransportError};

/// Message fragments recognized when the error kind is not specific.
const TEXT_RULES: [(&str, FailureCategory); 6] = [
    ("getaddrinfo", FailureCategory::AddressResolution),
    ("ENOTFOUND", FailureCategory::AddressResolution),
    ("ECONNREFUSED", FailureCategory::ConnectionRefused),
    ("ETIMEDOUT", FailureCategory::Timeout),
    ("invalid internal state", FailureCategory::InvalidSessionState),
    ("security", FailureCategory::SecurityNegotiation),
];

/// Maps a transport error to a failure category.
///
/// The error kind decides first; free-form messages fall back to text
/// matching.
pub fn classify(error: &TransportError) -> FailureCategory {
    match error {
        TransportError::Resolve(_) => FailureCategory::AddressResolution,
        TransportError::Refused(_) => FailureCategory::ConnectionRefused,
        TransportError::Timeout => FailureCategory::Timeout,
        TransportError::InvalidState(_) | TransportError::Closed => {
            FailureCategory::InvalidSessionState
        }
        TransportError::Security(_) => FailureCategory::SecurityNegotiation,
        TransportError::Other(message) => classify_text(message),
        TransportError::Cancelled | TransportError::BadStatus(_) => FailureCategory::Unknown,
    }
}

fn classify_text(message: &str) -> FailureCategory {
    TEXT_RULES
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(FailureCategory::Unknown)
}

/// Builds the structured failure reported for a connect error.
pub fn connect_failure(error: &TransportError) -> ConnectFailure {
    ConnectFailure::new(classify(error), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcwatch_protocol::StatusCode;

    #[test]
    fn kind_decides_first() {
        assert_eq!(
            classify(&TransportError::Refused("x".into())),
            FailureCategory::ConnectionRefused
        );
        assert_eq!(
            classify(&TransportError::Resolve("x".into())),
            FailureCategory::AddressResolution
        );
        assert_eq!(classify(&TransportError::Timeout), FailureCategory::Timeout);
        assert_eq!(
            classify(&TransportError::Security("x".into())),
            FailureCategory::SecurityNegotiation
        );
        assert_eq!(classify(&TransportError::Closed), FailureCategory::InvalidSessionState);
        // A refused error mentioning security is still refused.
        assert_eq!(
            classify(&TransportError::Refused("security".into())),
            FailureCategory::ConnectionRefused
        );
    }

    #[test]
    fn text_fallback() {
        let cases = [
            ("getaddrinfo ENOTFOUND plc.local", FailureCategory::AddressResolution),
            ("connect ECONNREFUSED 10.0.0.1:4840", FailureCategory::ConnectionRefused),
            ("connect ETIMEDOUT 10.0.0.1:4840", FailureCategory::Timeout),
            ("The client is in an invalid internal state", FailureCategory::InvalidSessionState),
            ("no matching security policy", FailureCategory::SecurityNegotiation),
            ("something odd", FailureCategory::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(
                classify(&TransportError::Other(message.into())),
                expected,
                "{message}"
            );
        }
    }

    #[test]
    fn unknown_kinds() {
        assert_eq!(classify(&TransportError::Cancelled), FailureCategory::Unknown);
        assert_eq!(
            classify(&TransportError::BadStatus(StatusCode::BAD_TIMEOUT)),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn failure_carries_remedy_and_message() {
        let failure = connect_failure(&TransportError::Refused("connect ECONNREFUSED".into()));
        assert_eq!(failure.category, FailureCategory::ConnectionRefused);
        assert_eq!(failure.remedy, FailureCategory::ConnectionRefused.remedy());
        assert!(failure.message.contains("ECONNREFUSED"));
    }
}
