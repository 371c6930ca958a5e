//! Pull-based [`Read`] adapters that run [`AesGcm`] over a byte stream.
//!
//! Both adapters transform data in the caller's buffer as it is read, so
//! memory use is bounded by the caller's buffer plus one tag, whatever the
//! object size. Errors from the wrapped reader pass through unchanged; crypto
//! failures are reported as [`io::ErrorKind::InvalidData`] carrying a
//! [`CipherError`].

use std::io::{self, Read};

use super::gcm::{AesGcm, CipherError, TAG_LEN};

/// Returns `true` if `err` reports a failed tag check.
pub fn is_authentication_failure(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|e| e.downcast_ref::<CipherError>())
        .is_some_and(|e| matches!(e, CipherError::AuthenticationFailed))
}

fn crypto_error(err: CipherError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Encrypts the wrapped reader, yielding `ciphertext || tag`.
#[derive(Debug)]
pub struct EncryptReader<R> {
    inner: R,
    gcm: Option<AesGcm>,
    tag: [u8; TAG_LEN],
    tag_pos: usize,
}

impl<R: Read> EncryptReader<R> {
    pub(crate) fn new(inner: R, gcm: AesGcm) -> Self {
        Self {
            inner,
            gcm: Some(gcm),
            tag: [0u8; TAG_LEN],
            tag_pos: 0,
        }
    }
}

impl<R: Read> Read for EncryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(gcm) = self.gcm.as_mut() {
            let n = self.inner.read(buf)?;
            if n > 0 {
                gcm.encrypt_in_place(&mut buf[..n]).map_err(crypto_error)?;
                return Ok(n);
            }
            if let Some(gcm) = self.gcm.take() {
                self.tag = gcm.finalize();
            }
        }

        let remaining = &self.tag[self.tag_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.tag_pos += n;
        Ok(n)
    }
}

#[derive(Debug)]
enum DecryptState {
    Reading(AesGcm),
    Verified,
    Failed,
}

/// Decrypts `ciphertext || tag` from the wrapped reader.
///
/// The final 16 bytes are held back as the expected tag and checked once the
/// wrapped reader reports end of stream. On mismatch every further `read`
/// fails with an authentication error; the stream never ends cleanly.
///
/// Plaintext returned before end of stream is unauthenticated. Consumers that
/// act on it must be prepared to discard it if the final read fails.
///
/// The reader owns its source: dropping it drops the source, whether or not
/// the stream was read to the end.
#[derive(Debug)]
pub struct DecryptReader<R> {
    inner: R,
    state: DecryptState,
    tail: [u8; TAG_LEN],
    tail_len: usize,
}

impl<R: Read> DecryptReader<R> {
    pub(crate) fn new(inner: R, gcm: AesGcm) -> Self {
        Self {
            inner,
            state: DecryptState::Reading(gcm),
            tail: [0u8; TAG_LEN],
            tail_len: 0,
        }
    }

    /// Moves the held-back tail and `buf[..n]` so that `buf[..m]` holds the
    /// oldest `m` ciphertext bytes and the newest `TAG_LEN` bytes sit in
    /// `tail`. Returns `m`.
    fn rotate_tail(&mut self, buf: &mut [u8], n: usize) -> usize {
        let total = self.tail_len + n;
        if total <= TAG_LEN {
            self.tail[self.tail_len..total].copy_from_slice(&buf[..n]);
            self.tail_len = total;
            return 0;
        }

        let m = total - TAG_LEN;
        let mut new_tail = [0u8; TAG_LEN];
        if m >= self.tail_len {
            let split = m - self.tail_len;
            new_tail.copy_from_slice(&buf[split..n]);
            buf.copy_within(0..split, self.tail_len);
            buf[..self.tail_len].copy_from_slice(&self.tail[..self.tail_len]);
        } else {
            let keep = self.tail_len - m;
            new_tail[..keep].copy_from_slice(&self.tail[m..self.tail_len]);
            new_tail[keep..].copy_from_slice(&buf[..n]);
            buf[..m].copy_from_slice(&self.tail[..m]);
        }
        self.tail = new_tail;
        self.tail_len = TAG_LEN;
        m
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                DecryptState::Verified => return Ok(0),
                DecryptState::Failed => {
                    return Err(crypto_error(CipherError::AuthenticationFailed))
                }
                DecryptState::Reading(_) => {}
            }

            let n = self.inner.read(buf)?;
            if n == 0 {
                let state = std::mem::replace(&mut self.state, DecryptState::Failed);
                if let DecryptState::Reading(gcm) = state {
                    // A stream shorter than a tag cannot be authentic.
                    if self.tail_len == TAG_LEN && gcm.verify(&self.tail).is_ok() {
                        self.state = DecryptState::Verified;
                    }
                }
                continue;
            }

            let m = self.rotate_tail(buf, n);
            if m == 0 {
                continue;
            }
            if let DecryptState::Reading(gcm) = &mut self.state {
                gcm.decrypt_in_place(&mut buf[..m]).map_err(crypto_error)?;
            }
            return Ok(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::gcm::{KEY_LEN, NONCE_LEN};
    use std::io::Cursor;

    /// Hands out at most `max` bytes per read.
    struct Trickle<R> {
        inner: R,
        max: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.max);
            self.inner.read(&mut buf[..len])
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "socket closed"))
        }
    }

    fn engine() -> AesGcm {
        AesGcm::new(&[5u8; KEY_LEN], &[6u8; NONCE_LEN]).unwrap()
    }

    fn read_with(mut r: impl Read, chunk: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn encrypt_output_independent_of_read_sizes() {
        let plaintext: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let whole = read_with(EncryptReader::new(Cursor::new(&plaintext), engine()), 8192).unwrap();
        assert_eq!(whole.len(), plaintext.len() + TAG_LEN);

        for (src_max, chunk) in [(1, 3), (7, 16), (100, 5), (4096, 1)] {
            let src = Trickle {
                inner: Cursor::new(&plaintext),
                max: src_max,
            };
            let got = read_with(EncryptReader::new(src, engine()), chunk).unwrap();
            assert_eq!(got, whole, "src_max={src_max} chunk={chunk}");
        }
    }

    #[test]
    fn decrypt_handles_any_read_sizes() {
        let plaintext: Vec<u8> = (0..777u32).map(|i| (i * 3) as u8).collect();
        let sealed = read_with(EncryptReader::new(Cursor::new(&plaintext), engine()), 64).unwrap();

        for (src_max, chunk) in [(1, 1), (3, 40), (16, 16), (17, 2), (1000, 7), (1000, 4096)] {
            let src = Trickle {
                inner: Cursor::new(&sealed),
                max: src_max,
            };
            let got = read_with(DecryptReader::new(src, engine()), chunk).unwrap();
            assert_eq!(got, plaintext, "src_max={src_max} chunk={chunk}");
        }
    }

    #[test]
    fn empty_plaintext_is_just_a_tag() {
        let sealed = read_with(EncryptReader::new(Cursor::new(Vec::new()), engine()), 4).unwrap();
        assert_eq!(sealed.len(), TAG_LEN);
        let opened = read_with(DecryptReader::new(Cursor::new(sealed), engine()), 4).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn truncated_stream_is_authentication_failure() {
        let err = read_with(DecryptReader::new(Cursor::new(vec![0u8; 10]), engine()), 32)
            .unwrap_err();
        assert!(is_authentication_failure(&err));
    }

    #[test]
    fn failure_is_sticky() {
        let mut sealed =
            read_with(EncryptReader::new(Cursor::new(b"payload".to_vec()), engine()), 64).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x80;

        let mut r = DecryptReader::new(Cursor::new(sealed), engine());
        let mut buf = [0u8; 64];
        assert_eq!(r.read(&mut buf).unwrap(), 7);
        let first = r.read(&mut buf).unwrap_err();
        assert!(is_authentication_failure(&first));
        let second = r.read(&mut buf).unwrap_err();
        assert!(is_authentication_failure(&second));
    }

    #[test]
    fn transport_errors_pass_through() {
        let err = read_with(EncryptReader::new(Broken, engine()), 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(!is_authentication_failure(&err));

        let err = read_with(DecryptReader::new(Broken, engine()), 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(!is_authentication_failure(&err));
    }
}
