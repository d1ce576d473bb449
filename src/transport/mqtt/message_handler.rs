//! Classification of rumqttc events
//!
//! The supervisor acts on an [`EventRoute`]; only some routes reach the
//! Jobs driver as a [`TransportEvent`].

use crate::transport::TransportEvent;
use bytes::Bytes;
use rumqttc::v5::{mqttbytes::v5::Packet, Event};

pub struct MessageHandler;

impl MessageHandler {
    pub fn classify(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnAck,
                Packet::Publish(publish) => EventRoute::Publish {
                    topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                    payload: publish.payload.clone(),
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::BrokerDisconnect(format!("{:?}", disconnect.reason_code))
                }
                Packet::SubAck(suback) => EventRoute::SubAck {
                    packet_id: suback.pkid,
                    detail: format!("{:?}", suback.return_codes),
                },
                other => EventRoute::Other(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::Outgoing,
        }
    }

    /// What the driver sees for `route`; broker housekeeping stays internal
    pub fn forwarded_event(route: &EventRoute) -> Option<TransportEvent> {
        match route {
            EventRoute::ConnAck => Some(TransportEvent::Connected),
            EventRoute::Publish { topic, payload } => Some(TransportEvent::Message {
                topic: topic.clone(),
                payload: payload.clone(),
            }),
            EventRoute::BrokerDisconnect(reason) => Some(TransportEvent::Disconnected(reason.clone())),
            EventRoute::SubAck { .. }
            | EventRoute::Other(_)
            | EventRoute::Outgoing => None,
        }
    }
}

/// What an inbound or outbound MQTT event means to the supervisor
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Session (re)established
    ConnAck,
    Publish { topic: String, payload: Bytes },
    /// Broker-initiated DISCONNECT with its reason code
    BrokerDisconnect(String),
    SubAck { packet_id: u16, detail: String },
    /// Pings, acks and anything else inbound
    Other(String),
    Outgoing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode, Publish,
    };
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        let route = MessageHandler::classify(&connack);
        assert!(matches!(route, EventRoute::ConnAck));
        assert_eq!(
            MessageHandler::forwarded_event(&route),
            Some(TransportEvent::Connected)
        );
    }

    #[test]
    fn test_route_disconnect() {
        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        let route = MessageHandler::classify(&disconnect);
        assert!(matches!(route, EventRoute::BrokerDisconnect(ref reason) if reason.contains("NormalDisconnection")));
        assert!(matches!(
            MessageHandler::forwarded_event(&route),
            Some(TransportEvent::Disconnected(_))
        ));
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Bytes::from("$aws/things/T1/jobs/notify-next"),
            pkid: 0,
            payload: Bytes::from(r#"{"timestamp":1}"#),
            properties: None,
        }));

        let route = MessageHandler::classify(&publish);
        match MessageHandler::forwarded_event(&route) {
            Some(TransportEvent::Message { topic, payload }) => {
                assert_eq!(topic, "$aws/things/T1/jobs/notify-next");
                assert_eq!(&payload[..], br#"{"timestamp":1}"#);
            }
            other => panic!("Expected message event, got {other:?}"),
        }
    }

    #[test]
    fn test_outgoing_events_are_not_forwarded() {
        let ping = Event::Outgoing(rumqttc::Outgoing::PingReq);
        let route = MessageHandler::classify(&ping);
        assert!(matches!(route, EventRoute::Outgoing));
        assert_eq!(MessageHandler::forwarded_event(&route), None);
    }
}
