use rand::{rngs::OsRng, Rng, RngCore};

/// Six-digit login code, leading zeros kept.
pub fn login_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Four-digit recovery code in `1000..=9999`.
pub fn recovery_code() -> String {
    OsRng.gen_range(1000..=9999u32).to_string()
}

/// `len` random bytes, hex encoded.
pub fn hex_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
