//! Captive DNS: every A query resolves to the portal.

use super::PacketError;

pub const DNS_PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const ANSWER_LEN: usize = 16;
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;
const TTL_SECS: u32 = 60;

/// Answer `query` with `address`, writing the response into `reply`.
///
/// Queries for other record types get an empty answer section so clients
/// fall back to A. Returns `None` for anything that is not a standard query.
pub fn answer_query(
    query: &[u8],
    address: [u8; 4],
    reply: &mut [u8],
) -> Result<Option<usize>, PacketError> {
    if query.len() < HEADER_LEN {
        return Err(PacketError::Truncated);
    }
    let is_response = query[2] & 0x80 != 0;
    let opcode = (query[2] >> 3) & 0x0F;
    let questions = u16::from_be_bytes([query[4], query[5]]);
    if is_response || opcode != 0 || questions == 0 {
        return Ok(None);
    }

    // Only the first question is answered.
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos).ok_or(PacketError::Truncated)? as usize;
        if len & 0xC0 != 0 {
            return Err(PacketError::Malformed);
        }
        pos += 1;
        if len == 0 {
            break;
        }
        pos += len;
    }
    let fixed = query.get(pos..pos + 4).ok_or(PacketError::Truncated)?;
    let qtype = u16::from_be_bytes([fixed[0], fixed[1]]);
    let qclass = u16::from_be_bytes([fixed[2], fixed[3]]);
    let question_end = pos + 4;

    let answer = qtype == TYPE_A && qclass == CLASS_IN;
    let total = question_end + if answer { ANSWER_LEN } else { 0 };
    if reply.len() < total {
        return Err(PacketError::ReplyTooSmall);
    }

    reply[..2].copy_from_slice(&query[..2]);
    // QR, AA, RD echoed; RA; NOERROR.
    reply[2] = 0x84 | (query[2] & 0x01);
    reply[3] = 0x80;
    reply[4..6].copy_from_slice(&1u16.to_be_bytes());
    reply[6..8].copy_from_slice(&u16::from(answer).to_be_bytes());
    reply[8..12].fill(0);
    reply[HEADER_LEN..question_end].copy_from_slice(&query[HEADER_LEN..question_end]);

    if answer {
        let record = &mut reply[question_end..total];
        // Name is a pointer to the question.
        record[..2].copy_from_slice(&[0xC0, HEADER_LEN as u8]);
        record[2..4].copy_from_slice(&TYPE_A.to_be_bytes());
        record[4..6].copy_from_slice(&CLASS_IN.to_be_bytes());
        record[6..10].copy_from_slice(&TTL_SECS.to_be_bytes());
        record[10..12].copy_from_slice(&4u16.to_be_bytes());
        record[12..16].copy_from_slice(&address);
    }

    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    const PORTAL: [u8; 4] = [192, 168, 4, 1];

    fn query(name: &str, qtype: u16) -> Vec<u8> {
        let mut packet = alloc::vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        for label in name.split('.') {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0);
        packet.extend_from_slice(&qtype.to_be_bytes());
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());
        packet
    }

    #[test]
    fn test_a_query_resolves_to_portal() {
        let packet = query("connectivitycheck.gstatic.com", TYPE_A);
        let mut reply = [0u8; 512];
        let len = answer_query(&packet, PORTAL, &mut reply).unwrap().unwrap();

        assert_eq!(len, packet.len() + ANSWER_LEN);
        assert_eq!(&reply[..2], &[0x12, 0x34], "id echoed");
        assert_eq!(reply[2] & 0x80, 0x80, "marked as response");
        assert_eq!(reply[2] & 0x01, 0x01, "recursion desired echoed");
        assert_eq!(&reply[6..8], &[0, 1], "one answer");
        assert_eq!(&reply[HEADER_LEN..packet.len()], &packet[HEADER_LEN..]);
        assert_eq!(&reply[len - 4..len], &PORTAL);
    }

    #[test]
    fn test_aaaa_query_gets_empty_answer() {
        let packet = query("example.com", 28);
        let mut reply = [0u8; 512];
        let len = answer_query(&packet, PORTAL, &mut reply).unwrap().unwrap();

        assert_eq!(len, packet.len());
        assert_eq!(&reply[6..8], &[0, 0]);
    }

    #[test]
    fn test_responses_and_empty_queries_ignored() {
        let mut reply = [0u8; 512];
        let mut response = query("example.com", TYPE_A);
        response[2] |= 0x80;
        assert_eq!(answer_query(&response, PORTAL, &mut reply), Ok(None));

        let mut no_questions = query("example.com", TYPE_A);
        no_questions[5] = 0;
        assert_eq!(answer_query(&no_questions, PORTAL, &mut reply), Ok(None));
    }

    #[test]
    fn test_truncated_and_compressed_questions_rejected() {
        let mut reply = [0u8; 512];
        let packet = query("example.com", TYPE_A);
        assert_eq!(
            answer_query(&packet[..packet.len() - 2], PORTAL, &mut reply),
            Err(PacketError::Truncated)
        );

        let mut compressed = packet.clone();
        compressed[HEADER_LEN] = 0xC0;
        assert_eq!(answer_query(&compressed, PORTAL, &mut reply), Err(PacketError::Malformed));

        assert_eq!(answer_query(&[0; 4], PORTAL, &mut reply), Err(PacketError::Truncated));
    }
}
