//! Rules query (`V` request, `E` response).

use std::collections::HashMap;

use crate::{request_writer, response_writer, ByteReader, ChallengeKey, CursorError, QueryKind};

/// Server rules (cvars) by name.
pub type Rules = HashMap<String, String>;

/// Rules request datagram carrying `challenge`.
pub fn encode_request(challenge: ChallengeKey) -> Vec<u8> {
    let mut writer = request_writer(QueryKind::Rules);
    writer.write_i32_le(challenge.0);
    writer.into_inner()
}

/// Decodes the body of an `E` response (marker already stripped). A name
/// that appears twice keeps its last value.
pub fn decode(body: &[u8]) -> Result<Rules, CursorError> {
    let mut reader = ByteReader::new(body);
    let count = reader.read_i16_le()?;

    let mut rules = Rules::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let name = reader.read_cstring()?;
        let value = reader.read_cstring()?;
        rules.insert(name, value);
    }

    Ok(rules)
}

/// Encodes an `E` response from name/value pairs, in the given order.
pub fn encode_response<'a, I>(rules: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let pairs: Vec<(&str, &str)> = rules.into_iter().take(i16::MAX as usize).collect();

    let mut writer = response_writer(QueryKind::Rules);
    writer.write_i16_le(pairs.len() as i16);
    for (name, value) in pairs {
        writer.write_cstring(name).write_cstring(value);
    }
    writer.into_inner()
}
