//! Status bodies returned while polling ARM long-running operations.

use serde_json::Value;

/// Body of an `Azure-AsyncOperation` status resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

impl OperationStatus {
    pub fn from_body(body: &Value) -> Self {
        let status = body.get("status").and_then(Value::as_str).unwrap_or("");
        if status.eq_ignore_ascii_case("Succeeded") {
            OperationStatus::Succeeded
        } else if status.eq_ignore_ascii_case("Failed") || status.eq_ignore_ascii_case("Canceled") {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Operation {status}"));
            OperationStatus::Failed(message)
        } else {
            OperationStatus::InProgress
        }
    }
}

/// `properties.provisioningState` of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    /// No state reported; treated as settled.
    Absent,
    Pending(String),
    Terminal(String),
}

impl ProvisioningState {
    pub fn from_resource(body: &Value) -> Self {
        match body
            .pointer("/properties/provisioningState")
            .and_then(Value::as_str)
        {
            None => ProvisioningState::Absent,
            Some(state)
                if ["Succeeded", "Failed", "Canceled"]
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(state)) =>
            {
                ProvisioningState::Terminal(state.to_string())
            }
            Some(state) => ProvisioningState::Pending(state.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProvisioningState::Pending(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_status_in_progress() {
        assert_eq!(
            OperationStatus::from_body(&json!({"status": "InProgress"})),
            OperationStatus::InProgress
        );
        assert_eq!(OperationStatus::from_body(&json!({})), OperationStatus::InProgress);
    }

    #[test]
    fn test_operation_status_failed_carries_message() {
        let body = json!({"status": "Failed", "error": {"code": "Conflict", "message": "slot busy"}});
        assert_eq!(
            OperationStatus::from_body(&body),
            OperationStatus::Failed("slot busy".to_string())
        );
        assert_eq!(
            OperationStatus::from_body(&json!({"status": "Canceled"})),
            OperationStatus::Failed("Operation Canceled".to_string())
        );
    }

    #[test]
    fn test_provisioning_state() {
        let running = json!({"properties": {"provisioningState": "Running"}});
        assert!(!ProvisioningState::from_resource(&running).is_terminal());

        let done = json!({"properties": {"provisioningState": "Succeeded"}});
        assert_eq!(
            ProvisioningState::from_resource(&done),
            ProvisioningState::Terminal("Succeeded".to_string())
        );

        assert!(ProvisioningState::from_resource(&json!({"name": "x"})).is_terminal());
    }
}
