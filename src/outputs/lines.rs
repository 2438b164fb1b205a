use std::io::{self, BufRead};

/// Forward-only line reader with one line of lookahead.
///
/// Lines are returned without their terminator; invalid UTF-8 is replaced so a
/// binary file simply fails to parse instead of aborting the read.
pub struct LineReader<R> {
    inner: R,
    peeked: Option<Option<String>>,
    consumed: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            consumed: 0,
        }
    }

    /// Look at the next line without consuming it.
    pub fn peek(&mut self) -> io::Result<Option<&str>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.read_raw()?);
        }
        Ok(self.peeked.as_ref().and_then(|l| l.as_deref()))
    }

    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let line = match self.peeked.take() {
            Some(line) => line,
            None => self.read_raw()?,
        };
        if line.is_some() {
            self.consumed += 1;
        }
        Ok(line)
    }

    /// Consume up to `n` lines; returns how many were actually there.
    pub fn skip(&mut self, n: usize) -> io::Result<usize> {
        for skipped in 0..n {
            if self.next_line()?.is_none() {
                return Ok(skipped);
            }
        }
        Ok(n)
    }

    /// Number of lines consumed so far (1-based number of the last line returned).
    pub fn line_number(&self) -> usize {
        self.consumed
    }

    fn read_raw(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.inner.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume() {
        let mut r = LineReader::new("a\r\nb\n".as_bytes());
        assert_eq!(r.peek().unwrap(), Some("a"));
        assert_eq!(r.peek().unwrap(), Some("a"));
        assert_eq!(r.line_number(), 0);
        assert_eq!(r.next_line().unwrap().as_deref(), Some("a"));
        assert_eq!(r.next_line().unwrap().as_deref(), Some("b"));
        assert_eq!(r.line_number(), 2);
        assert_eq!(r.peek().unwrap(), None);
        assert_eq!(r.next_line().unwrap(), None);
        assert_eq!(r.line_number(), 2);
    }

    #[test]
    fn skip_stops_at_eof() {
        let mut r = LineReader::new("1\n2\n3\n".as_bytes());
        assert_eq!(r.skip(2).unwrap(), 2);
        assert_eq!(r.skip(5).unwrap(), 1);
        assert_eq!(r.line_number(), 3);
    }
}
