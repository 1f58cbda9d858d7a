use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

const ID_BYTES: usize = 20;

pub const USER_ID_PREFIX: &str = "USER:";
pub const VM_ID_PREFIX: &str = "VM:";

/// 20 random bytes, url-safe base64 without padding.
pub fn next_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn next_user_id() -> String {
    format!("{}{}", USER_ID_PREFIX, next_id())
}

pub fn next_vm_id() -> String {
    format!("{}{}", VM_ID_PREFIX, next_id())
}
