//! MQTT-over-TLS telemetry link (rumqttc + rustls).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration,
    Transport,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};

use crate::endpoint::{PrinterEndpoint, TlsPolicy, DEVICE_USER};
use crate::retry::{classify_mqtt_error, ErrorKind};

use super::{LinkCloser, LinkError, LinkEvent, TelemetryLink};

const REQUEST_CAPACITY: usize = 16;

/// Settings for `MqttLink`.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub port: u16,
    pub keep_alive: Duration,
    pub tls: TlsPolicy,
    /// PEM bundle trusted when self-signed certificates are not accepted.
    pub ca_file: Option<PathBuf>,
    pub client_id: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            port: 8883,
            keep_alive: Duration::from_secs(30),
            tls: TlsPolicy {
                accept_self_signed: true,
            },
            ca_file: None,
            client_id: format!("jobmirror-{}", std::process::id()),
        }
    }
}

/// Telemetry link to the device's MQTT broker.
pub struct MqttLink {
    endpoint: PrinterEndpoint,
    settings: MqttSettings,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    /// Set when the closer queued a DISCONNECT that the event loop must flush.
    disconnect_queued: Arc<AtomicBool>,
}

impl MqttLink {
    pub fn new(endpoint: PrinterEndpoint, settings: MqttSettings) -> Self {
        Self {
            endpoint,
            settings,
            client: None,
            eventloop: None,
            connected: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
            disconnect_queued: Arc::new(AtomicBool::new(false)),
        }
    }

    fn options(&self) -> Result<MqttOptions, LinkError> {
        let mut opts = MqttOptions::new(
            self.settings.client_id.clone(),
            self.endpoint.host().to_string(),
            self.settings.port,
        );
        opts.set_credentials(DEVICE_USER, self.endpoint.access_code());
        opts.set_keep_alive(self.settings.keep_alive);
        opts.set_clean_session(true);
        opts.set_transport(self.transport()?);
        Ok(opts)
    }

    fn transport(&self) -> Result<Transport, LinkError> {
        if self.settings.tls.accept_self_signed {
            let config = self_signed_client_config()
                .map_err(|e| LinkError::new(ErrorKind::Other, format!("tls config: {}", e)))?;
            return Ok(Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(config))));
        }
        let path = self.settings.ca_file.as_ref().ok_or_else(|| {
            LinkError::new(ErrorKind::Other, "a CA file is required when self-signed certificates are refused")
        })?;
        let ca = std::fs::read(path)
            .map_err(|e| LinkError::new(ErrorKind::Other, format!("read {}: {}", path.display(), e)))?;
        Ok(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }))
    }

    fn mark(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn finish(&mut self) -> LinkEvent {
        self.mark(false);
        self.eventloop = None;
        LinkEvent::Finished
    }

    fn client(&self) -> Result<&AsyncClient, LinkError> {
        self.client
            .as_ref()
            .ok_or_else(|| LinkError::new(ErrorKind::Connection, "link not opened"))
    }
}

#[async_trait]
impl TelemetryLink for MqttLink {
    /// Resolves after the broker's CONNACK, so the session is already
    /// accepted when this returns.
    async fn open(&mut self) -> Result<(), LinkError> {
        let (client, mut eventloop) = AsyncClient::new(self.options()?, REQUEST_CAPACITY);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => continue,
                Err(e) => return Err(mqtt_failure(&e)),
            }
        }
        self.mark(true);
        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Drive the event loop for `window` so a broker that drops the session
    /// right after CONNACK is noticed before subscribing.
    async fn settle(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        while let Some(eventloop) = self.eventloop.as_mut() {
            match tokio::time::timeout_at(deadline, eventloop.poll()).await {
                Err(_) => break,
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    self.mark(false);
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::debug!("telemetry session dropped while settling: {}", e);
                    self.mark(false);
                    break;
                }
            }
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.client()?
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| LinkError::new(ErrorKind::Connection, e.to_string()))
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), LinkError> {
        self.client()?
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| LinkError::new(ErrorKind::Connection, e.to_string()))
    }

    async fn next_event(&mut self) -> LinkEvent {
        if self.closing.load(Ordering::SeqCst) && !self.disconnect_queued.load(Ordering::SeqCst) {
            return self.finish();
        }
        let Some(eventloop) = self.eventloop.as_mut() else {
            return LinkEvent::Finished;
        };
        let polled = eventloop.poll().await;
        if self.closing.load(Ordering::SeqCst) {
            return match polled {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    tracing::debug!("telemetry disconnect sent");
                    self.finish()
                }
                Ok(_) => LinkEvent::Idle,
                Err(e) => {
                    tracing::debug!("telemetry session ended while closing: {}", e);
                    self.finish()
                }
            };
        }
        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                self.mark(true);
                LinkEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(p))) => LinkEvent::Message {
                topic: p.topic,
                payload: p.payload.to_vec(),
            },
            Ok(Event::Incoming(Packet::Disconnect)) => {
                self.mark(false);
                LinkEvent::Closed("broker sent disconnect".to_string())
            }
            Ok(_) => LinkEvent::Idle,
            Err(ConnectionError::RequestsDone) => self.finish(),
            Err(e) => {
                self.mark(false);
                let failure = mqtt_failure(&e);
                LinkEvent::Errored {
                    kind: failure.kind,
                    message: failure.message,
                }
            }
        }
    }

    fn closer(&self) -> LinkCloser {
        let client = self.client.clone();
        let connected = Arc::clone(&self.connected);
        let closing = Arc::clone(&self.closing);
        let queued = Arc::clone(&self.disconnect_queued);
        Box::new(move || {
            if let Some(client) = client {
                if connected.swap(false, Ordering::SeqCst) {
                    client.try_disconnect()?;
                    queued.store(true, Ordering::SeqCst);
                    tracing::debug!("telemetry disconnect requested");
                }
            }
            closing.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn mqtt_failure(e: &ConnectionError) -> LinkError {
    LinkError::new(classify_mqtt_error(e), e.to_string())
}

/// Client config that accepts any server certificate but still checks
/// handshake signatures against it.
fn self_signed_client_config() -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(AcceptAnyServerCert {
        provider: Arc::clone(&provider),
    });
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
