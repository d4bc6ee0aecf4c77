// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::errors::*;

    fn api_error(status: u16) -> NetworkError {
        NetworkError::Api {
            status,
            code: "Code".to_string(),
            message: "message".to_string(),
        }
    }

    #[test]
    fn test_throttling_and_server_errors_are_transient() {
        for status in [408, 409, 429, 500, 502, 503, 504] {
            assert!(
                api_error(status).is_transient(),
                "HTTP {status} should be transient"
            );
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [400, 401, 403, 404] {
            assert!(
                !api_error(status).is_transient(),
                "HTTP {status} should not be transient"
            );
            assert_eq!(api_error(status).kind(), "permanent");
        }
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = NetworkError::Timeout(600);
        assert!(err.is_transient());
        assert_eq!(err.kind(), "transient");
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn test_operation_failed_classification() {
        let canceled = NetworkError::OperationFailed {
            status: "Canceled".to_string(),
            message: "superseded".to_string(),
        };
        let failed = NetworkError::OperationFailed {
            status: "Failed".to_string(),
            message: "SecurityRuleConflict".to_string(),
        };
        assert!(canceled.is_transient());
        assert!(!failed.is_transient());
    }

    #[test]
    fn test_missing_nsg_is_permanent() {
        let err = NetworkError::NoSecurityGroup("nodes".to_string());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("nodes"));
    }

    #[test]
    fn test_duplicate_priority_message() {
        let err = RuleError::DuplicatePriority {
            priority: 2000,
            direction: "Inbound".to_string(),
            first: "allow-web".to_string(),
            second: "hostNetwork-ns-app1".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("allow-web"));
        assert!(message.contains("hostNetwork-ns-app1"));
        assert!(message.contains("2000"));
    }

    #[test]
    fn test_reconcile_error_is_transparent_for_rules() {
        let err: ReconcileError = RuleError::DuplicateName("dup".to_string()).into();
        assert_eq!(err.to_string(), "Duplicate security rule name 'dup'");
    }
}
