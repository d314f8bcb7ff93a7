//! Accès au dernier échange requête/réponse d'un client SOAP

/// A transport client able to hand back the raw bytes of its last call
pub trait LastExchange {
    fn last_request_headers(&self) -> &[u8];

    fn last_request(&self) -> &[u8];

    fn last_response_headers(&self) -> &[u8];

    fn last_response(&self) -> &[u8];
}

/// Échange enregistré en mémoire
///
/// Utile pour les transports qui n'exposent pas eux-mêmes leur dernier
/// échange : le code appelant enregistre les octets envoyés et reçus puis
/// passe l'instance au [`Dumper`](crate::Dumper).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedExchange {
    request_headers: Vec<u8>,
    request_body: Vec<u8>,
    response_headers: Vec<u8>,
    response_body: Vec<u8>,
}

impl RecordedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, headers: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        self.record_request(headers, body);
        self
    }

    pub fn with_response(mut self, headers: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        self.record_response(headers, body);
        self
    }

    pub fn record_request(&mut self, headers: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) {
        self.request_headers = headers.into();
        self.request_body = body.into();
    }

    pub fn record_response(&mut self, headers: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) {
        self.response_headers = headers.into();
        self.response_body = body.into();
    }
}

impl LastExchange for RecordedExchange {
    fn last_request_headers(&self) -> &[u8] {
        &self.request_headers
    }

    fn last_request(&self) -> &[u8] {
        &self.request_body
    }

    fn last_response_headers(&self) -> &[u8] {
        &self.response_headers
    }

    fn last_response(&self) -> &[u8] {
        &self.response_body
    }
}
