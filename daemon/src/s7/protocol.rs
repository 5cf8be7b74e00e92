//! S7comm wire framing: TPKT, COTP, and the S7 "Setup Communication" /
//! "Read Var" PDUs needed to pull MB/EB/AB memory areas off a controller.
//!
//! This is the minimum subset of the protocol the sampler needs — no
//! write support, no other function codes, no DB area addressing.

use crate::error::ObserverError;

const TPKT_VERSION: u8 = 0x03;
const COTP_PDU_DATA: u8 = 0xF0;

/// S7 memory area codes as used in a Read Var request item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Merker = 0x83,
    Input = 0x81,
    Output = 0x82,
}

/// One read request: an area, a byte offset, and a byte count.
#[derive(Debug, Clone, Copy)]
pub struct ReadItem {
    pub area: Area,
    pub offset: u16,
    pub count: u16,
}

/// Wraps an S7 PDU in a TPKT header followed by a minimal COTP data header.
pub fn wrap_tpkt_cotp(payload: &[u8]) -> Vec<u8> {
    let cotp_header = [0x02u8, COTP_PDU_DATA, 0x80];
    let total_len = 4 + cotp_header.len() + payload.len();
    let mut out = Vec::with_capacity(total_len);
    out.push(TPKT_VERSION);
    out.push(0x00);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    out.extend_from_slice(&cotp_header);
    out.extend_from_slice(payload);
    out
}

/// Strips the TPKT + COTP headers, returning the S7 PDU payload.
pub fn unwrap_tpkt_cotp(frame: &[u8]) -> Result<&[u8], ObserverError> {
    if frame.len() < 7 {
        return Err(ObserverError::Transport("frame shorter than TPKT+COTP header".into()));
    }
    if frame[0] != TPKT_VERSION {
        return Err(ObserverError::Transport(format!("unexpected TPKT version {}", frame[0])));
    }
    let declared_len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    if declared_len != frame.len() {
        return Err(ObserverError::Transport("TPKT length mismatch".into()));
    }
    Ok(&frame[7..])
}

/// Builds a COTP Connection Request frame (rack/slot encoded into the TSAP).
pub fn build_cotp_connection_request(rack: u16, slot: u16) -> Vec<u8> {
    let dst_tsap: u16 = 0x0100 | (rack << 5) | slot;
    let src_tsap: u16 = 0x0100;

    let mut body = vec![
        0xE0, // PDU type: CR
        0x00, 0x00, // dst reference
        0x00, 0x01, // src reference
        0x00, // class/options
    ];
    body.push(0xC1);
    body.push(0x02);
    body.extend_from_slice(&src_tsap.to_be_bytes());
    body.push(0xC2);
    body.push(0x02);
    body.extend_from_slice(&dst_tsap.to_be_bytes());
    body.push(0xC0);
    body.push(0x01);
    body.push(0x0A); // proposed TPDU size: 1024

    let len_byte = body.len() as u8;
    let mut out = vec![len_byte];
    out.extend_from_slice(&body);

    let mut frame = vec![TPKT_VERSION, 0x00];
    let total_len = 4 + out.len();
    frame.extend_from_slice(&(total_len as u16).to_be_bytes());
    frame.extend_from_slice(&out);
    frame
}

/// Builds the S7 "Setup Communication" negotiation PDU requesting the given
/// max PDU length.
pub fn build_setup_communication(pdu_size: u16) -> Vec<u8> {
    let mut pdu = vec![
        0x32, // protocol id
        0x01, // rosctr: job
        0x00, 0x00, // reserved
        0x00, 0x01, // pdu reference
        0x00, 0x08, // param length
        0x00, 0x00, // data length
        0xF0, // function: setup communication
        0x00, // reserved
        0x00, 0x01, // max amq calling
        0x00, 0x01, // max amq called
    ];
    pdu.extend_from_slice(&pdu_size.to_be_bytes());
    wrap_tpkt_cotp(&pdu)
}

/// Builds a Read Var request (function code 0x04) for up to 20 items.
pub fn build_read_var_request(items: &[ReadItem]) -> Vec<u8> {
    let mut params = vec![
        0x04, // function: read var
        items.len() as u8,
    ];
    for item in items {
        params.push(0x12); // var spec type: S7ANY
        params.push(0x0A); // spec length
        params.push(0x10); // syntax id: S7ANY
        params.push(0x02); // transport size: byte
        params.extend_from_slice(&item.count.to_be_bytes());
        params.extend_from_slice(&[0x00, 0x00]); // DB number (unused)
        params.push(item.area as u8);
        let bit_offset = (item.offset as u32) * 8;
        params.push(((bit_offset >> 16) & 0xFF) as u8);
        params.push(((bit_offset >> 8) & 0xFF) as u8);
        params.push((bit_offset & 0xFF) as u8);
    }

    let param_len = params.len() as u16;
    let mut pdu = vec![
        0x32, // protocol id
        0x01, // rosctr: job
        0x00, 0x00,
        0x00, 0x02, // pdu reference
    ];
    pdu.extend_from_slice(&param_len.to_be_bytes());
    pdu.extend_from_slice(&0u16.to_be_bytes()); // data length
    pdu.extend_from_slice(&params);
    wrap_tpkt_cotp(&pdu)
}

/// Parses a Read Var response, returning one byte buffer per requested item
/// in request order.
pub fn parse_read_var_response(pdu: &[u8], expected_items: usize) -> Result<Vec<Vec<u8>>, ObserverError> {
    if pdu.len() < 12 {
        return Err(ObserverError::Transport("read-var response too short".into()));
    }
    let mut cursor = 12; // skip header + param header up to item count
    let mut results = Vec::with_capacity(expected_items);

    for _ in 0..expected_items {
        if cursor + 4 > pdu.len() {
            return Err(ObserverError::Transport("truncated read-var item header".into()));
        }
        let return_code = pdu[cursor];
        let data_len_bits = u16::from_be_bytes([pdu[cursor + 2], pdu[cursor + 3]]);
        let data_len = (data_len_bits / 8) as usize;
        cursor += 4;

        if return_code != 0xFF {
            return Err(ObserverError::Transport(format!("read-var item returned code 0x{return_code:02X}")));
        }
        if cursor + data_len > pdu.len() {
            return Err(ObserverError::Transport("truncated read-var item payload".into()));
        }
        results.push(pdu[cursor..cursor + data_len].to_vec());
        cursor += data_len;
        if data_len % 2 != 0 {
            cursor += 1; // word alignment padding
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tpkt_roundtrip_preserves_payload() {
        let payload = vec![0x32, 0x01, 0x02, 0x03];
        let wrapped = wrap_tpkt_cotp(&payload);
        let unwrapped = unwrap_tpkt_cotp(&wrapped).unwrap();
        assert_eq!(unwrapped, payload.as_slice());
    }

    #[test]
    fn connection_request_encodes_rack_slot_into_dst_tsap() {
        let frame = build_cotp_connection_request(0, 2);
        // dst tsap appears after the 0xC2 0x02 marker near the tail.
        let marker_pos = frame.windows(2).position(|w| w == [0xC2, 0x02]).unwrap();
        let dst_tsap = u16::from_be_bytes([frame[marker_pos + 2], frame[marker_pos + 3]]);
        assert_eq!(dst_tsap, 0x0102);
    }

    #[test]
    fn read_var_request_rejects_short_response() {
        let err = parse_read_var_response(&[0u8; 4], 1);
        assert!(err.is_err());
    }
}
