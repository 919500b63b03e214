//! Classify curl and MQTT transport errors into retry policy error kinds.

use crate::retry::policy::ErrorKind;

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_login_denied() {
        return ErrorKind::Rejected;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_ssl_connect_error()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify an MQTT event-loop error for reconnect decisions.
pub fn classify_mqtt_error(e: &rumqttc::ConnectionError) -> ErrorKind {
    use rumqttc::{ConnectReturnCode, ConnectionError};
    match e {
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => ErrorKind::Timeout,
        ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized,
        ) => ErrorKind::Rejected,
        ConnectionError::RequestsDone => ErrorKind::Other,
        _ => ErrorKind::Connection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnectReturnCode, ConnectionError};

    #[test]
    fn mqtt_timeouts_and_refusals() {
        assert_eq!(classify_mqtt_error(&ConnectionError::NetworkTimeout), ErrorKind::Timeout);
        assert_eq!(
            classify_mqtt_error(&ConnectionError::ConnectionRefused(
                ConnectReturnCode::BadUserNamePassword
            )),
            ErrorKind::Rejected
        );
        assert_eq!(classify_mqtt_error(&ConnectionError::RequestsDone), ErrorKind::Other);
    }

    #[test]
    fn mqtt_io_errors_are_connection_drops() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let kind = classify_mqtt_error(&ConnectionError::Io(io));
        assert_eq!(kind, ErrorKind::Connection);
        assert!(kind.drops_session());
    }

    #[test]
    fn curl_timeout_classified() {
        // CURLE_OPERATION_TIMEDOUT = 28, CURLE_LOGIN_DENIED = 67, CURLE_COULDNT_CONNECT = 7
        assert_eq!(classify_curl_error(&curl::Error::new(28)), ErrorKind::Timeout);
        assert_eq!(classify_curl_error(&curl::Error::new(67)), ErrorKind::Rejected);
        assert_eq!(classify_curl_error(&curl::Error::new(7)), ErrorKind::Connection);
    }
}
