//! Bus message types.
//!
//! Inbound control messages arrive from the parent process; outbound
//! messages go to the parent bus and, for characteristic updates, to each
//! current subscriber of the channel. The wire dialect keeps the bus field
//! names the parent expects (`status`, `content`, `timeStamp`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bedwatch_types::{Channel, LifecycleState, SampleEvent, SampleValue, SubscriberId};

/// One channel/interval pair in a subscription or service announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Channel name.
    pub characteristic: Channel,
    /// Requested or offered delivery interval, in seconds.
    pub interval: f64,
}

/// Inbound control messages.
///
/// Anything that fails to parse as one of these is logged as unrecognized
/// and dropped by the bus reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Connect to the device and start polling.
    Configure,
    /// A subscriber announcing itself; answered with the service descriptor.
    AppInit {
        /// The requesting subscriber.
        id: SubscriberId,
    },
    /// A subscriber (re)declaring which channels it wants.
    AppRequest {
        /// The requesting subscriber.
        id: SubscriberId,
        /// Requested channels and intervals.
        service: Vec<ServiceEntry>,
    },
    /// An actuation attempt. The device is read-only, so this is always
    /// rejected; a command without `data` is malformed on top of that.
    AppCommand {
        /// The sending subscriber.
        id: SubscriberId,
        /// Command payload, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

/// Outbound bus messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusMessage {
    /// Service descriptor reply to an app-init request.
    Service(ServiceResponse),
    /// A sample fanned out to one subscriber.
    Characteristic(CharacteristicUpdate),
    /// Lifecycle state-change notification to the parent.
    State(StateNotification),
}

/// Lifecycle state-change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateNotification {
    /// Adaptor id.
    pub id: String,
    /// Always `"state"`.
    pub status: String,
    /// The state just entered.
    pub state: LifecycleState,
}

impl StateNotification {
    /// Build a notification for the state just entered.
    pub fn new(id: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            id: id.into(),
            status: "state".to_string(),
            state,
        }
    }
}

/// Service descriptor reply to an app-init request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Adaptor name.
    pub name: String,
    /// Adaptor id.
    pub id: String,
    /// Always `"ok"`.
    pub status: String,
    /// Offered channels.
    pub service: Vec<ServiceEntry>,
    /// Always `"service"`.
    pub content: String,
    /// The subscriber this reply is addressed to.
    pub destination: SubscriberId,
}

impl ServiceResponse {
    /// Build the standard descriptor: one `binary_sensor` channel at the
    /// fixed poll interval.
    pub fn descriptor(
        name: impl Into<String>,
        id: impl Into<String>,
        interval: f64,
        destination: SubscriberId,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            status: "ok".to_string(),
            service: vec![ServiceEntry {
                characteristic: Channel::BinarySensor,
                interval,
            }],
            content: "service".to_string(),
            destination,
        }
    }
}

/// A sample delivered to one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicUpdate {
    /// Adaptor id.
    pub id: String,
    /// The subscriber this update is addressed to.
    pub destination: SubscriberId,
    /// Always `"characteristic"`.
    pub content: String,
    /// The channel the sample belongs to.
    pub characteristic: Channel,
    /// The sampled value.
    pub data: SampleValue,
    /// Fractional UNIX seconds.
    #[serde(rename = "timeStamp")]
    pub time_stamp: f64,
}

impl CharacteristicUpdate {
    /// Address one sample to one subscriber.
    pub fn new(id: impl Into<String>, destination: SubscriberId, event: &SampleEvent) -> Self {
        Self {
            id: id.into(),
            destination,
            content: "characteristic".to_string(),
            characteristic: event.channel,
            data: event.value,
            time_stamp: event.unix_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedwatch_types::BinaryState;

    #[test]
    fn test_control_message_parsing() {
        let msg: ControlMessage = serde_json::from_str(r#"{"type": "configure"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Configure);

        let msg: ControlMessage =
            serde_json::from_str(r#"{"type": "app_init", "id": "app1"}"#).unwrap();
        assert_eq!(
            msg,
            ControlMessage::AppInit {
                id: SubscriberId::from("app1")
            }
        );

        let msg: ControlMessage = serde_json::from_str(
            r#"{"type": "app_request", "id": "app1",
                "service": [{"characteristic": "binary_sensor", "interval": 5.0}]}"#,
        )
        .unwrap();
        match msg {
            ControlMessage::AppRequest { id, service } => {
                assert_eq!(id.as_str(), "app1");
                assert_eq!(service.len(), 1);
                assert_eq!(service[0].characteristic, Channel::BinarySensor);
                assert_eq!(service[0].interval, 5.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_app_command_data_is_optional() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"type": "app_command", "id": "app1"}"#).unwrap();
        assert_eq!(
            msg,
            ControlMessage::AppCommand {
                id: SubscriberId::from("app1"),
                data: None
            }
        );

        let msg: ControlMessage = serde_json::from_str(
            r#"{"type": "app_command", "id": "app1", "data": {"switch": "on"}}"#,
        )
        .unwrap();
        match msg {
            ControlMessage::AppCommand { data: Some(_), .. } => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type": "reboot"}"#).is_err());
        assert!(serde_json::from_str::<ControlMessage>("not json").is_err());
    }

    #[test]
    fn test_state_notification_wire_shape() {
        let msg = BusMessage::State(StateNotification::new("bedwatch", LifecycleState::Starting));
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "bedwatch");
        assert_eq!(json["status"], "state");
        assert_eq!(json["state"], "starting");
    }

    #[test]
    fn test_characteristic_update_wire_shape() {
        let event = SampleEvent::binary(BinaryState::On);
        let msg = CharacteristicUpdate::new("bedwatch", SubscriberId::from("app1"), &event);
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "characteristic");
        assert_eq!(json["characteristic"], "binary_sensor");
        assert_eq!(json["data"], "on");
        assert!(json["timeStamp"].as_f64().unwrap() > 0.0);
        assert_eq!(json["destination"], "app1");
    }

    #[test]
    fn test_service_descriptor_shape() {
        let msg = ServiceResponse::descriptor(
            "Bed occupancy sensor",
            "bedwatch",
            3.0,
            SubscriberId::from("app1"),
        );
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["content"], "service");
        assert_eq!(json["service"][0]["characteristic"], "binary_sensor");
        assert_eq!(json["service"][0]["interval"], 3.0);
    }
}
