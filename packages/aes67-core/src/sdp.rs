//! Deterministic SDP generation for the currently staged transport.

use crate::receiver::TransportParams;

/// Builds the session description for `params`, labelling the stream
/// with `stream_label`. Always produces exactly 7 CRLF-terminated lines.
pub fn build(params: &TransportParams, stream_label: &str) -> String {
    let lines = [
        "v=0".to_string(),
        format!("o=- 0 0 IN IP4 {}", params.destination_ip),
        format!("s={stream_label}"),
        "t=0 0".to_string(),
        format!("c=IN IP4 {}/{}", params.destination_ip, params.ttl),
        format!(
            "m=audio {} RTP/AVP {}",
            params.destination_port, params.payload_type
        ),
        format!(
            "a=rtpmap:{} {}/{}/1",
            params.payload_type, params.encoding_name, params.sample_rate
        ),
    ];
    let mut sdp = lines.join("\r\n");
    sdp.push_str("\r\n");
    sdp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_seven_crlf_lines() {
        let params = TransportParams::default();
        let sdp = build(&params, "AES67 Mono Receiver");
        let lines: Vec<&str> = sdp.split("\r\n").collect();
        // 7 content lines + trailing empty string after the final \r\n
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[7], "");
        assert_eq!(lines[0], "v=0");
        assert_eq!(lines[1], "o=- 0 0 IN IP4 239.0.0.1");
        assert_eq!(lines[2], "s=AES67 Mono Receiver");
        assert_eq!(lines[3], "t=0 0");
        assert_eq!(lines[4], "c=IN IP4 239.0.0.1/64");
        assert_eq!(lines[5], "m=audio 5004 RTP/AVP 96");
        assert_eq!(lines[6], "a=rtpmap:96 L24/48000/1");
    }

    #[test]
    fn build_reflects_nondefault_params() {
        let params = TransportParams {
            destination_ip: "239.1.2.3".to_string(),
            destination_port: 6000,
            ttl: 32,
            sample_rate: 96000,
            encoding_name: "L16".to_string(),
            payload_type: 98,
            ..TransportParams::default()
        };
        let sdp = build(&params, "label");
        assert!(sdp.contains("c=IN IP4 239.1.2.3/32"));
        assert!(sdp.contains("m=audio 6000 RTP/AVP 98"));
        assert!(sdp.contains("a=rtpmap:98 L16/96000/1"));
    }
}
