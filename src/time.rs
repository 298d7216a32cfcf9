use chrono::{DateTime, Utc};

/// Generates the packet timestamp: UNIX seconds truncated to 32 bits.
///
/// ```
/// use openvpn_probe::time::generate_timestamp;
/// let timestamp = generate_timestamp();
/// println!("Timestamp is {}", timestamp);
/// ```
pub fn generate_timestamp() -> u32 {
    convert_dt_to_unix32(Utc::now())
}

fn convert_dt_to_unix32(date: DateTime<Utc>) -> u32 {
    date.timestamp() as u32
}
