//! Chained AES-CBC + HMAC-SHA256 frame cipher
//!
//! Used by appliances that expose the plain `ws://` endpoint. Each
//! direction keeps its CBC chain and its last authentication tag for the
//! whole connection, so frames must be processed in wire order and a fresh
//! [`AesHmacCipher`] is needed for every connection.
//!
//! ## Frame Layout
//!
//! ```text
//! +----------------------------------+------------------+
//! | AES-256-CBC ciphertext (N * 16B) | HMAC[0..16] (16B)|
//! +----------------------------------+------------------+
//! ```
//!
//! The tag covers `IV || direction || previous tag || ciphertext`, where the
//! direction byte is `0x45` ('E') for frames we send and `0x43` ('C') for
//! frames the appliance sends.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{error, trace, warn};

use crate::error::{HcdError, Result};

type HmacSha256 = Hmac<Sha256>;

const BLOCK_SIZE: usize = 16;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

const DIRECTION_OUTBOUND: u8 = 0x45;
const DIRECTION_INBOUND: u8 = 0x43;

/// Result of decrypting one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    /// Whether the frame's tag matched the expected chained HMAC
    pub verified: bool,
}

/// Stateful cipher for one connection
pub struct AesHmacCipher {
    aes: Aes256,
    mac_key: [u8; KEY_SIZE],
    iv: [u8; BLOCK_SIZE],
    tx_chain: [u8; BLOCK_SIZE],
    rx_chain: [u8; BLOCK_SIZE],
    last_tx_tag: [u8; TAG_SIZE],
    last_rx_tag: [u8; TAG_SIZE],
    tx_direction: u8,
    rx_direction: u8,
    integrity_failures: u64,
}

impl AesHmacCipher {
    /// Build a cipher from the base64url key (32 bytes) and IV (16 bytes)
    /// of an appliance profile.
    pub fn new(key: &str, iv: &str) -> Result<Self> {
        let key = decode_key_material(key, KEY_SIZE, "key")?;
        let iv: [u8; BLOCK_SIZE] = decode_key_material(iv, BLOCK_SIZE, "iv")?
            .try_into()
            .map_err(|_| HcdError::InvalidKey("iv must be 16 bytes".into()))?;

        let enc_key = hmac_sha256(&key, &[b"ENC"])?;
        let mac_key = hmac_sha256(&key, &[b"MAC"])?;
        let aes = Aes256::new_from_slice(&enc_key)
            .map_err(|_| HcdError::InvalidKey("derived encryption key has wrong length".into()))?;

        Ok(Self {
            aes,
            mac_key,
            iv,
            tx_chain: iv,
            rx_chain: iv,
            last_tx_tag: [0u8; TAG_SIZE],
            last_rx_tag: [0u8; TAG_SIZE],
            tx_direction: DIRECTION_OUTBOUND,
            rx_direction: DIRECTION_INBOUND,
            integrity_failures: 0,
        })
    }

    /// Encrypt one outbound frame, advancing the outbound chain
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut pad_len = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
        if pad_len == 1 {
            pad_len += BLOCK_SIZE;
        }

        let mut buf = Vec::with_capacity(plaintext.len() + pad_len + TAG_SIZE);
        buf.extend_from_slice(plaintext);
        let pad_start = buf.len();
        buf.resize(pad_start + pad_len, 0);
        rand::thread_rng().fill_bytes(&mut buf[pad_start + 1..pad_start + pad_len - 1]);
        buf[pad_start] = 0x00;
        buf[pad_start + pad_len - 1] = pad_len as u8;

        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            for (b, c) in block.iter_mut().zip(self.tx_chain.iter()) {
                *b ^= c;
            }
            self.aes.encrypt_block(block.into());
            self.tx_chain.copy_from_slice(block);
        }

        let tag = self.tag(self.tx_direction, &self.last_tx_tag, &buf);
        self.last_tx_tag = tag;
        buf.extend_from_slice(&tag);

        trace!("Encrypted {} bytes: {}", plaintext.len(), hex::encode(&buf));
        buf
    }

    /// Decrypt one inbound frame, advancing the inbound chain.
    ///
    /// Malformed frames and tag mismatches are logged; decryption continues
    /// on a best-effort basis and the outcome is reported in
    /// [`Decrypted::verified`].
    pub fn decrypt(&mut self, frame: &[u8]) -> Decrypted {
        trace!("Decrypting {} bytes: {}", frame.len(), hex::encode(frame));

        if frame.len() < BLOCK_SIZE + TAG_SIZE || frame.len() % BLOCK_SIZE != 0 {
            error!("Malformed encrypted frame of {} bytes", frame.len());
        }
        if frame.len() < TAG_SIZE {
            self.integrity_failures += 1;
            return Decrypted {
                plaintext: Vec::new(),
                verified: false,
            };
        }

        let (ciphertext, received_tag) = frame.split_at(frame.len() - TAG_SIZE);
        let expected_tag = self.tag(self.rx_direction, &self.last_rx_tag, ciphertext);
        let verified: bool = expected_tag.ct_eq(received_tag).into();
        if !verified {
            self.integrity_failures += 1;
            warn!(
                "HMAC mismatch: expected {}, received {}",
                hex::encode(expected_tag),
                hex::encode(received_tag)
            );
        }
        self.last_rx_tag.copy_from_slice(received_tag);

        let whole_blocks = ciphertext.len() - ciphertext.len() % BLOCK_SIZE;
        let mut plaintext = ciphertext[..whole_blocks].to_vec();
        for block in plaintext.chunks_exact_mut(BLOCK_SIZE) {
            let mut next_chain = [0u8; BLOCK_SIZE];
            next_chain.copy_from_slice(block);
            self.aes.decrypt_block(block.into());
            for (b, c) in block.iter_mut().zip(self.rx_chain.iter()) {
                *b ^= c;
            }
            self.rx_chain = next_chain;
        }

        match plaintext.last().map(|&b| b as usize) {
            Some(pad_len) if pad_len <= plaintext.len() => {
                plaintext.truncate(plaintext.len() - pad_len);
            }
            Some(pad_len) => {
                error!("Padding error: pad length {} exceeds {} decrypted bytes", pad_len, plaintext.len());
            }
            None => {}
        }

        Decrypted { plaintext, verified }
    }

    /// Number of inbound frames that failed authentication so far
    pub fn integrity_failures(&self) -> u64 {
        self.integrity_failures
    }

    fn tag(&self, direction: u8, previous: &[u8; TAG_SIZE], ciphertext: &[u8]) -> [u8; TAG_SIZE] {
        let mut tag = [0u8; TAG_SIZE];
        // mac_key is always 32 bytes, which HMAC accepts
        if let Ok(digest) = hmac_sha256(&self.mac_key, &[&self.iv, &[direction], previous, ciphertext]) {
            tag.copy_from_slice(&digest[..TAG_SIZE]);
        }
        tag
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; KEY_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| HcdError::InvalidKey(format!("hmac key: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut digest = [0u8; KEY_SIZE];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}

/// Decode base64url key material, tolerating trailing `=` padding
pub(crate) fn decode_key_material(value: &str, expected_len: usize, what: &str) -> Result<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD.decode(value.trim().trim_end_matches('='))?;
    if bytes.len() != expected_len {
        return Err(HcdError::InvalidKey(format!(
            "{} must be {} bytes, got {}",
            what,
            expected_len,
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";
    const IV: &str = "oKGio6SlpqeoqaqrrK2urw";

    /// The same cipher from the appliance's end of the connection
    fn appliance_side() -> AesHmacCipher {
        let mut cipher = AesHmacCipher::new(KEY, IV).unwrap();
        cipher.tx_direction = DIRECTION_INBOUND;
        cipher.rx_direction = DIRECTION_OUTBOUND;
        cipher
    }

    #[test]
    fn test_rejects_bad_key_material() {
        assert!(matches!(AesHmacCipher::new("AAEC", IV), Err(HcdError::InvalidKey(_))));
        assert!(matches!(AesHmacCipher::new(KEY, "!!!"), Err(HcdError::InvalidKey(_))));
    }

    #[test]
    fn test_roundtrip_chained() {
        let mut tx = AesHmacCipher::new(KEY, IV).unwrap();
        let mut rx = AesHmacCipher::new(KEY, IV).unwrap();

        for len in [1usize, 14, 15, 16, 17, 31, 32, 100, 4096] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let frame = tx.encrypt(&plaintext);
            assert_eq!(frame.len() % BLOCK_SIZE, 0);
            assert!(frame.len() >= BLOCK_SIZE + TAG_SIZE);

            // The receiver decrypts with the same CBC chain; only the tag
            // direction differs, so verification fails but the data survives.
            let decrypted = rx.decrypt(&frame);
            assert_eq!(decrypted.plaintext, plaintext, "length {}", len);
        }
    }

    #[test]
    fn test_padding_never_single_byte() {
        let mut cipher = AesHmacCipher::new(KEY, IV).unwrap();
        // 15 bytes would need exactly one pad byte; a full extra block is added instead
        let frame = cipher.encrypt(&[0x41; 15]);
        assert_eq!(frame.len(), 32 + TAG_SIZE);
        let frame = cipher.encrypt(&[0x41; 14]);
        assert_eq!(frame.len(), 16 + TAG_SIZE);
    }

    #[test]
    fn test_verified_inbound_frames() {
        let mut peer = appliance_side();
        let mut cipher = AesHmacCipher::new(KEY, IV).unwrap();

        for text in ["{\"a\":1}", "{\"b\":2}", "{\"c\":3}"] {
            let frame = peer.encrypt(text.as_bytes());
            let decrypted = cipher.decrypt(&frame);
            assert!(decrypted.verified);
            assert_eq!(decrypted.plaintext, text.as_bytes());
        }
        assert_eq!(cipher.integrity_failures(), 0);
    }

    #[test]
    fn test_both_directions_verify_against_peer() {
        let mut client = AesHmacCipher::new(KEY, IV).unwrap();
        let mut appliance = appliance_side();

        // Interleaved traffic: each direction keeps its own chain and tag
        for round in 0..4 {
            let request = format!("{{\"msgID\":{}}}", round);
            let decrypted = appliance.decrypt(&client.encrypt(request.as_bytes()));
            assert!(decrypted.verified, "request {}", round);
            assert_eq!(decrypted.plaintext, request.as_bytes());

            let reply = format!("{{\"msgID\":{},\"action\":\"RESPONSE\"}}", round);
            let decrypted = client.decrypt(&appliance.encrypt(reply.as_bytes()));
            assert!(decrypted.verified, "reply {}", round);
            assert_eq!(decrypted.plaintext, reply.as_bytes());
        }
        assert_eq!(client.integrity_failures(), 0);
        assert_eq!(appliance.integrity_failures(), 0);
    }

    #[test]
    fn test_reflected_frame_fails_verification() {
        let mut client = AesHmacCipher::new(KEY, IV).unwrap();
        let mut other_client = AesHmacCipher::new(KEY, IV).unwrap();

        let frame = client.encrypt(b"{\"sID\":1}");
        let decrypted = other_client.decrypt(&frame);
        assert!(!decrypted.verified);
        assert_eq!(decrypted.plaintext, b"{\"sID\":1}");
        assert_eq!(other_client.integrity_failures(), 1);
    }

    #[test]
    fn test_identical_plaintexts_get_distinct_tags() {
        let mut cipher = AesHmacCipher::new(KEY, IV).unwrap();
        let first = cipher.encrypt(b"same");
        let second = cipher.encrypt(b"same");
        assert_ne!(first[first.len() - TAG_SIZE..], second[second.len() - TAG_SIZE..]);
        assert_ne!(first[..16], second[..16]);
    }

    #[test]
    fn test_tampered_frame_is_flagged_but_decrypted() {
        let mut peer = appliance_side();
        let mut cipher = AesHmacCipher::new(KEY, IV).unwrap();

        let mut frame = peer.encrypt(b"hello appliance");
        let last = frame.len() - 1;
        frame[last] ^= 0xff;

        let decrypted = cipher.decrypt(&frame);
        assert!(!decrypted.verified);
        assert_eq!(decrypted.plaintext, b"hello appliance");
        assert_eq!(cipher.integrity_failures(), 1);
    }

    #[test]
    fn test_malformed_frames_do_not_panic() {
        let mut cipher = AesHmacCipher::new(KEY, IV).unwrap();
        assert!(cipher.decrypt(&[]).plaintext.is_empty());
        assert!(!cipher.decrypt(&[1, 2, 3]).verified);
        let odd = cipher.decrypt(&[0u8; 40]);
        assert!(!odd.verified);
        assert!(odd.plaintext.len() <= 16);
    }
}
