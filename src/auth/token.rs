//! Per-session auth token issuance and verification.
//!
//! `token = {nonce, hex-hmac(key, userId ‖ nonce ‖ roomId)}`, bound to the destination
//! room so a token minted for one room cannot be replayed against another.

use super::error::AuthError;
use crate::protocol::types::{ClientId, RoomId};
use crate::protocol::Token;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Issue a token binding `client_id` to `room_id`, signed with the app's key.
pub fn issue(key: &[u8], client_id: &ClientId, room_id: &RoomId) -> Token {
    let mut nonce_bytes = [0u8; 16];
    getrandom::fill(&mut nonce_bytes).expect("getrandom should not fail on a supported platform");
    let nonce = nonce_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();

    let hmac = sign(key, client_id, &nonce, room_id);
    Token { nonce, hmac }
}

/// Verify a token previously issued by [`issue`] for the same `(client_id, room_id)`
/// pair, in constant time.
pub fn verify(
    key: &[u8],
    token: &Token,
    client_id: &ClientId,
    room_id: &RoomId,
) -> Result<(), AuthError> {
    let expected = sign(key, client_id, &token.nonce, room_id);
    let expected_bytes = hex_decode(&expected).map_err(AuthError::Malformed)?;
    let actual_bytes = hex_decode(&token.hmac).map_err(AuthError::Malformed)?;

    if expected_bytes.len() != actual_bytes.len()
        || expected_bytes.ct_eq(&actual_bytes).unwrap_u8() == 0
    {
        return Err(AuthError::BadSignature);
    }
    Ok(())
}

fn sign(key: &[u8], client_id: &ClientId, nonce: &str, room_id: &RoomId) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(client_id.as_bytes());
    mac.update(b"\xe2\x80\x96"); // U+2016 DOUBLE VERTICAL LINE, as a concatenation separator
    mac.update(nonce.as_bytes());
    mac.update(b"\xe2\x80\x96");
    mac.update(room_id.as_bytes());
    let bytes = mac.finalize().into_bytes();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_for_the_same_binding() {
        let key = b"app-secret-key";
        let client = "client-1".to_string();
        let room = "abcdef0123456789".to_string();

        let token = issue(key, &client, &room);
        assert!(verify(key, &token, &client, &room).is_ok());
    }

    #[test]
    fn token_rejected_for_a_different_room() {
        let key = b"app-secret-key";
        let client = "client-1".to_string();
        let room = "abcdef0123456789".to_string();
        let other_room = "ffffffffffffffff".to_string();

        let token = issue(key, &client, &room);
        assert!(verify(key, &token, &client, &other_room).is_err());
    }

    #[test]
    fn token_rejected_for_a_different_key() {
        let client = "client-1".to_string();
        let room = "abcdef0123456789".to_string();

        let token = issue(b"key-one", &client, &room);
        assert!(verify(b"key-two", &token, &client, &room).is_err());
    }
}
