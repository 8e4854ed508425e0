//! Wire obfuscation for the smart-strip protocol: a rolling-XOR autokey
//! stream with initial key 171. This is compatibility plumbing, not
//! cryptography; the device rejects anything that is not bit-exact.

/// Initial key for the autokey stream.
const INITIAL_KEY: u8 = 171;

/// Obfuscate a command for the wire.
///
/// Each output byte is `key ^ input`, and the key becomes the *output*
/// byte. With `prepend_length` a 4-byte big-endian plaintext length is
/// placed in front, unencrypted. The stream transport requires it; the
/// datagram one omits it.
pub fn encode(plaintext: &str, prepend_length: bool) -> Vec<u8> {
    let bytes = plaintext.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + if prepend_length { 4 } else { 0 });

    if prepend_length {
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    }

    let mut key = INITIAL_KEY;
    for &b in bytes {
        let c = key ^ b;
        key = c; // key tracks the ciphertext byte
        out.push(c);
    }
    out
}

/// Recover the plaintext of a device response.
///
/// Mirror of [`encode`] except the key becomes the *input* byte; the
/// asymmetric key update is what makes the two directions inverse.
/// Bytes map to chars one-to-one (the protocol is latin-1 on the wire).
pub fn decode(data: &[u8]) -> String {
    let mut key = INITIAL_KEY;
    let mut out = String::with_capacity(data.len());
    for &c in data {
        out.push((key ^ c) as char);
        key = c; // key tracks the ciphertext byte here too
    }
    out
}

// ===========================================================================
// Tests
// ===========================================================================
