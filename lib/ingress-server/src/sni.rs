//! Best-effort TLS ClientHello SNI extraction (spec §4.8 "Peek the
//! ClientHello; look up by SNI"). The teacher's own TLS stack
//! (`tokio-rustls`/`rustls` 0.20, predating the `Acceptor` peek API
//! later rustls versions added) has no built-in "parse just the SNI"
//! entry point, so this parses the wire format directly per RFC 8446
//! §4.1.2 / RFC 6066 §3. Returns `None` on anything truncated or
//! malformed rather than erroring: the caller falls back to the
//! default-certificate path (spec §4.8 "no match -> fall back to HTTP
//! default certificate termination").
//!
//! Assumes the whole ClientHello arrives in the peeked buffer, which
//! holds for the vast majority of real client hellos (a handful of
//! extensions, no huge session ticket); pathological clients that split
//! it across TLS records fall back to the same default-certificate path.

const HANDSHAKE_CONTENT_TYPE: u8 = 22;
const CLIENT_HELLO_HANDSHAKE_TYPE: u8 = 1;
const SERVER_NAME_EXTENSION: u16 = 0;
const HOST_NAME_TYPE: u8 = 0;

pub fn extract_sni(buf: &[u8]) -> Option<String> {
    let mut r = Reader::new(buf);

    if r.take_u8()? != HANDSHAKE_CONTENT_TYPE {
        return None;
    }
    r.skip(2)?; // legacy record version
    let record_len = r.take_u16()? as usize;
    let mut handshake = Reader::new(r.take(record_len)?);

    if handshake.take_u8()? != CLIENT_HELLO_HANDSHAKE_TYPE {
        return None;
    }
    let hello_len = handshake.take_u24()?;
    let mut hello = Reader::new(handshake.take(hello_len)?);

    hello.skip(2)?; // client_version
    hello.skip(32)?; // random
    let session_id_len = hello.take_u8()? as usize;
    hello.skip(session_id_len)?;
    let cipher_suites_len = hello.take_u16()? as usize;
    hello.skip(cipher_suites_len)?;
    let compression_len = hello.take_u8()? as usize;
    hello.skip(compression_len)?;

    if hello.remaining() == 0 {
        return None; // no extensions, therefore no SNI
    }
    let extensions_len = hello.take_u16()? as usize;
    let mut extensions = Reader::new(hello.take(extensions_len)?);

    while extensions.remaining() > 0 {
        let ext_type = extensions.take_u16()?;
        let ext_len = extensions.take_u16()? as usize;
        let ext_data = extensions.take(ext_len)?;
        if ext_type == SERVER_NAME_EXTENSION {
            return parse_server_name_list(ext_data);
        }
    }
    None
}

fn parse_server_name_list(data: &[u8]) -> Option<String> {
    let mut r = Reader::new(data);
    let list_len = r.take_u16()? as usize;
    let mut list = Reader::new(r.take(list_len)?);
    while list.remaining() > 0 {
        let name_type = list.take_u8()?;
        let name_len = list.take_u16()? as usize;
        let name = list.take(name_len)?;
        if name_type == HOST_NAME_TYPE {
            return std::str::from_utf8(name).ok().map(str::to_string);
        }
    }
    None
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    fn take_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn take_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn take_u24(&mut self) -> Option<usize> {
        self.take(3)
            .map(|b| ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal ClientHello record carrying only a server_name
    /// extension for `hostname`.
    fn client_hello_with_sni(hostname: &str) -> Vec<u8> {
        let mut server_name_list = Vec::new();
        server_name_list.push(HOST_NAME_TYPE);
        server_name_list.extend_from_slice(&(hostname.len() as u16).to_be_bytes());
        server_name_list.extend_from_slice(hostname.as_bytes());

        let mut sni_ext_data = Vec::new();
        sni_ext_data.extend_from_slice(&(server_name_list.len() as u16).to_be_bytes());
        sni_ext_data.extend_from_slice(&server_name_list);

        let mut extensions = Vec::new();
        extensions.extend_from_slice(&SERVER_NAME_EXTENSION.to_be_bytes());
        extensions.extend_from_slice(&(sni_ext_data.len() as u16).to_be_bytes());
        extensions.extend_from_slice(&sni_ext_data);

        let mut hello_body = Vec::new();
        hello_body.extend_from_slice(&[0x03, 0x03]); // client_version
        hello_body.extend_from_slice(&[0u8; 32]); // random
        hello_body.push(0); // session_id_len
        hello_body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]); // one cipher suite
        hello_body.push(1); // compression methods len
        hello_body.push(0); // null compression
        hello_body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        hello_body.extend_from_slice(&extensions);

        let mut handshake = Vec::new();
        handshake.push(CLIENT_HELLO_HANDSHAKE_TYPE);
        let len = hello_body.len() as u32;
        handshake.extend_from_slice(&len.to_be_bytes()[1..]); // u24
        handshake.extend_from_slice(&hello_body);

        let mut record = Vec::new();
        record.push(HANDSHAKE_CONTENT_TYPE);
        record.extend_from_slice(&[0x03, 0x01]); // legacy record version
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    #[test]
    fn extracts_sni_from_well_formed_client_hello() {
        let record = client_hello_with_sni("example.com");
        assert_eq!(extract_sni(&record).as_deref(), Some("example.com"));
    }

    #[test]
    fn returns_none_on_truncated_buffer() {
        let record = client_hello_with_sni("example.com");
        assert_eq!(extract_sni(&record[..10]), None);
    }

    #[test]
    fn returns_none_on_non_handshake_record() {
        let mut record = client_hello_with_sni("example.com");
        record[0] = 23; // application data, not handshake
        assert_eq!(extract_sni(&record), None);
    }
}
