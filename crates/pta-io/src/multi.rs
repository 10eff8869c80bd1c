//! Sequential reading across several sources.

use std::io::{self, Read};

/// Reads each source to exhaustion before moving to the next.
///
/// Sources are opened lazily: the iterator is only advanced once the current
/// source reports end of stream, so at most one segment is open at a time.
pub struct MultiReader<I, R> {
    sources: I,
    current: Option<R>,
    exhausted: bool,
}

impl<I, R> MultiReader<I, R>
where
    I: Iterator<Item = io::Result<R>>,
    R: Read,
{
    pub fn new(sources: impl IntoIterator<IntoIter = I>) -> Self {
        MultiReader {
            sources: sources.into_iter(),
            current: None,
            exhausted: false,
        }
    }

    fn advance(&mut self) -> io::Result<bool> {
        match self.sources.next() {
            Some(next) => {
                self.current = Some(next?);
                Ok(true)
            }
            None => {
                self.current = None;
                self.exhausted = true;
                Ok(false)
            }
        }
    }
}

impl<I, R> Read for MultiReader<I, R>
where
    I: Iterator<Item = io::Result<R>>,
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.exhausted {
            if let Some(reader) = self.current.as_mut() {
                let n = reader.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            self.advance()?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_sources_in_order() {
        let parts: Vec<io::Result<&[u8]>> = vec![Ok(&b"abc"[..]), Ok(&b""[..]), Ok(&b"def"[..]), Ok(&b"g"[..])];
        let mut reader = MultiReader::new(parts);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcdefg");
    }

    #[test]
    fn empty_source_list() {
        let parts: Vec<io::Result<&[u8]>> = Vec::new();
        let mut reader = MultiReader::new(parts);
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).unwrap(), 0);
    }

    #[test]
    fn open_failure_surfaces_when_reached() {
        let parts: Vec<io::Result<&[u8]>> = vec![
            Ok(&b"ok"[..]),
            Err(io::Error::new(io::ErrorKind::NotFound, "segment 1 missing")),
        ];
        let mut reader = MultiReader::new(parts);
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ok");
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
