// notify.rs

use std::future::Future;

use embedded_svc::{
    http::{Method, Status, client::Client as HttpClient},
    io::Read,
};
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use log::*;

use crate::*;

pub const SEND_ATTEMPTS: u32 = 3;
pub const SEND_RETRY_PAUSE: Duration = Duration::from_secs(2);

const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendError {
    NotConnected,
    Status(u16),
    Transport(String),
}

pub trait Relay {
    fn send(&mut self, message: &str) -> Result<(), SendError>;
}

/// Query-parameter percent-encoding: alphanumerics pass through, space
/// becomes `+`, every other byte becomes an uppercase `%XX` escape.
pub fn url_encode(text: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut encoded = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        match b {
            b' ' => encoded.push('+'),
            b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' => encoded.push(b as char),
            _ => {
                encoded.push('%');
                encoded.push(HEX[(b >> 4) as usize] as char);
                encoded.push(HEX[(b & 0x0f) as usize] as char);
            }
        }
    }
    encoded
}

/// CallMeBot-style relay: one GET per message, phone and API key as
/// query parameters, HTTP 200 means accepted.
pub struct HttpRelay {
    client: HttpClient<EspHttpConnection>,
    url: String,
    phone: String,
    apikey: String,
    state: Arc<MyState>,
}

impl HttpRelay {
    pub fn new(state: Arc<MyState>, config: &MyConfig) -> anyhow::Result<Self> {
        let connection = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(HTTP_TIMEOUT),
            ..Default::default()
        })?;

        Ok(HttpRelay {
            client: HttpClient::wrap(connection),
            url: config.relay_url.clone(),
            phone: config.phone.clone(),
            apikey: config.apikey.clone(),
            state,
        })
    }
}

impl Relay for HttpRelay {
    fn send(&mut self, message: &str) -> Result<(), SendError> {
        if !self.state.link_up() {
            warn!("WiFi down, not sending");
            return Err(SendError::NotConnected);
        }

        let url = format!(
            "{}?phone={}&text={}&apikey={}",
            self.url,
            self.phone,
            url_encode(message),
            self.apikey
        );

        info!("Sending report...");
        let request = self
            .client
            .request(Method::Get, &url, &[])
            .map_err(|e| SendError::Transport(format!("{e:?}")))?;
        let mut response = request
            .submit()
            .map_err(|e| SendError::Transport(format!("{e:?}")))?;

        let status = response.status();
        if status == 200 {
            info!("Report accepted.");
            return Ok(());
        }

        let mut body = Vec::new();
        let mut buffer = [0u8; 256];
        loop {
            match response.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => body.extend_from_slice(&buffer[..n]),
            }
        }
        if !body.is_empty() {
            error!("Relay response: {}", String::from_utf8_lossy(&body));
        }
        Err(SendError::Status(status))
    }
}

/// Attempts delivery up to `SEND_ATTEMPTS` times with a pause in
/// between, stopping as soon as the link is observed up after an
/// attempt. A live link does not prove the relay took the message; the
/// per-attempt HTTP outcome is logged so that gap stays visible.
pub async fn send_with_retry<R, L, P, F>(relay: &mut R, message: &str, link_up: L, pause: P) -> bool
where
    R: Relay,
    L: Fn() -> bool,
    P: Fn() -> F,
    F: Future<Output = ()>,
{
    for attempt in 1..=SEND_ATTEMPTS {
        match relay.send(message) {
            Ok(()) => info!("Delivery attempt {attempt}/{SEND_ATTEMPTS} accepted"),
            Err(e) => error!("Delivery attempt {attempt}/{SEND_ATTEMPTS} failed: {e:?}"),
        }
        pause().await;
        if link_up() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::collections::VecDeque;

    #[test]
    fn encodes_space_and_punctuation() {
        assert_eq!(url_encode("A B!"), "A+B%21");
    }

    #[test]
    fn alphanumerics_pass_through() {
        assert_eq!(url_encode("abcXYZ019"), "abcXYZ019");
    }

    #[test]
    fn multibyte_text_encodes_per_byte() {
        assert_eq!(url_encode("é"), "%C3%A9");
    }

    // reference decoder: recovers the byte sequence an encoded string stands for
    fn decode(encoded: &str) -> Vec<u8> {
        let bytes = encoded.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'+' => {
                    out.push(b' ');
                    i += 1;
                }
                b'%' => {
                    let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                    i += 3;
                }
                b => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        out
    }

    #[test]
    fn decoding_recovers_original_bytes() {
        for text in [
            "A B!",
            "soil moisture 42%",
            "raw=1024 & pct=0",
            "07/03/2024 06:05:04",
            "humidité à 50%",
        ] {
            assert_eq!(decode(&url_encode(text)), text.as_bytes());
        }
    }

    struct FakeRelay {
        calls: usize,
        results: VecDeque<Result<(), SendError>>,
    }

    impl FakeRelay {
        fn scripted(results: Vec<Result<(), SendError>>) -> Self {
            FakeRelay {
                calls: 0,
                results: results.into(),
            }
        }
    }

    impl Relay for FakeRelay {
        fn send(&mut self, _message: &str) -> Result<(), SendError> {
            self.calls += 1;
            self.results
                .pop_front()
                .unwrap_or(Err(SendError::NotConnected))
        }
    }

    #[test]
    fn retry_exhausts_all_attempts_when_link_stays_down() {
        let mut relay = FakeRelay::scripted(vec![
            Err(SendError::Status(500)),
            Err(SendError::Status(500)),
            Err(SendError::Status(500)),
        ]);
        let delivered = block_on(send_with_retry(&mut relay, "msg", || false, || async {}));
        assert!(!delivered);
        assert_eq!(relay.calls, 3);
    }

    #[test]
    fn link_up_after_attempt_counts_as_delivered() {
        // the known-soft success proxy: HTTP failed but the link is up
        let mut relay = FakeRelay::scripted(vec![Err(SendError::Status(503))]);
        let delivered = block_on(send_with_retry(&mut relay, "msg", || true, || async {}));
        assert!(delivered);
        assert_eq!(relay.calls, 1);
    }
}

// EOF
