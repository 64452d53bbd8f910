//! Delimited input reading
//!
//! Lines are read as bytes so a stray non-UTF-8 byte damages one row instead
//! of ending the stream. Blank lines are dropped before ordinals are
//! assigned; the header, when configured, is the first non-blank line.

use std::io::{self, BufRead};

use crate::config::InputFormat;
use crate::error::RowError;

/// One non-blank input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based physical line number
    pub line_no: u64,
    pub text: String,
}

/// Fields picked out of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFields<'a> {
    pub entity: &'a str,
    pub name: Option<&'a str>,
}

pub struct InputLines<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
    skip_header: bool,
}

impl<R: BufRead> Iterator for InputLines<R> {
    type Item = io::Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line_no += 1;

            let text = String::from_utf8_lossy(&self.buf);
            let text = text.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }
            if self.skip_header {
                self.skip_header = false;
                continue;
            }
            return Some(Ok(RawLine {
                line_no: self.line_no,
                text: text.to_string(),
            }));
        }
    }
}

impl InputFormat {
    pub fn lines<R: BufRead>(&self, reader: R) -> InputLines<R> {
        InputLines {
            reader,
            buf: Vec::new(),
            line_no: 0,
            skip_header: self.has_header,
        }
    }

    /// Pick the entity and name fields out of `line`
    pub fn extract<'a>(&self, line: &'a str) -> Result<RowFields<'a>, RowError> {
        let fields = self.split(line);
        let field = |index: usize| {
            fields.get(index).map(|f| f.trim()).ok_or(RowError::MissingField {
                needed: index,
                found: fields.len(),
            })
        };
        let entity = field(self.smiles_column)?;
        let name = self.name_column.map(field).transpose()?;
        Ok(RowFields { entity, name })
    }
}
