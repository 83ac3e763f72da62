use crate::error::ProtocolError;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha1::{Digest, Sha1};
use time::{macros::format_description, Duration, OffsetDateTime};

const PASSWORD_DIGEST_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const NONCE_ENCODING: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
const NONCE_LEN: usize = 20;

/// One-shot WS-Security token. Never reuse across requests.
#[derive(Debug, Clone)]
pub struct UsernameToken {
    pub username: String,
    pub nonce: Vec<u8>,
    pub created: String,
    pub digest: String,
}

impl UsernameToken {
    /// `offset` is the device clock minus the local clock.
    pub fn generate(username: &str, password: &str, offset: Duration) -> Result<Self, ProtocolError> {
        let at = OffsetDateTime::now_utc()
            .checked_add(offset)
            .ok_or_else(|| ProtocolError::Timestamp(format!("clock offset {offset} out of range")))?;
        let created = created_timestamp(at)?;
        let nonce = generate_nonce(NONCE_LEN);
        let digest = password_digest(&nonce, &created, password);
        Ok(Self {
            username: username.to_string(),
            nonce,
            created,
            digest,
        })
    }

    pub fn nonce_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.nonce)
    }
}

pub fn build_wsse_header(
    username: &str,
    password: &str,
    offset: Duration,
) -> Result<String, ProtocolError> {
    let token = UsernameToken::generate(username, password, offset)?;
    Ok(format!(
        r#"  <s:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" s:mustUnderstand="1">
      <UsernameToken>
        <Username>{}</Username>
        <Password Type="{}">{}</Password>
        <Nonce EncodingType="{}">{}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>
      </UsernameToken>
    </Security>
  </s:Header>
"#,
        xml_escape(&token.username),
        PASSWORD_DIGEST_TYPE,
        token.digest,
        NONCE_ENCODING,
        token.nonce_base64(),
        token.created
    ))
}

fn created_timestamp(at: OffsetDateTime) -> Result<String, ProtocolError> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].000Z");
    at.format(&format)
        .map_err(|err| ProtocolError::Timestamp(err.to_string()))
}

fn generate_nonce(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub(crate) fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    general_purpose::STANDARD.encode(digest)
}

pub(crate) fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
