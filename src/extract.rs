//! Text extraction from the document formats flick can read.
//!
//! Every reader returns the document's text as one string; anything that
//! cannot be turned into text fails with [`Error::Extraction`] instead of
//! feeding binary noise to the tokenizer.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::ZlibDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "" | "txt" | "text" | "md" | "markdown" => Some(DocumentFormat::PlainText),
            "docx" => Some(DocumentFormat::Docx),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

pub fn extract_text(path: &Path) -> Result<String> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        Error::extraction(
            path,
            "unsupported format (expected .txt, .md, .docx or .pdf)",
        )
    })?;

    let bytes = std::fs::read(path).map_err(|e| Error::extraction(path, e.to_string()))?;
    let text = match format {
        DocumentFormat::PlainText => plain_text(bytes).map_err(|reason| Error::extraction(path, reason))?,
        DocumentFormat::Docx => extract_docx(path)?,
        DocumentFormat::Pdf => pdf_text(&bytes).map_err(|reason| Error::extraction(path, reason))?,
    };

    info!(path = %path.display(), ?format, chars = text.len(), "extracted text");
    Ok(text)
}

/// Read UTF-8 text from any reader, e.g. stdin
pub fn extract_from_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    plain_text(bytes).map_err(|reason| Error::extraction("<stdin>", reason))
}

fn plain_text(bytes: Vec<u8>) -> std::result::Result<String, String> {
    if bytes.contains(&0) {
        return Err("looks like a binary file, not text".to_string());
    }

    let text = String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8 text: {e}"))?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

fn extract_docx(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::extraction(path, e.to_string()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::extraction(path, format!("not a docx container: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::extraction(path, format!("missing word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| Error::extraction(path, e.to_string()))?;

    docx_text(&xml).map_err(|e| Error::extraction(path, format!("malformed document.xml: {e}")))
}

/// Collect the text runs of a WordprocessingML body
pub fn docx_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" | b"p" => out.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => {
                out.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Event::GeneralRef(e) if in_text => {
                let entity = String::from_utf8_lossy(e.as_ref());
                if let Some(c) = resolve_entity(&entity) {
                    out.push(c);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

fn resolve_entity(entity: &str) -> Option<char> {
    match entity {
        "apos" => Some('\''),
        "quot" => Some('"'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Text shown by the content streams of a PDF file.
///
/// Handles uncompressed and FlateDecode streams with simple (single byte or
/// UTF-16BE) string encodings; fonts with custom CMaps are not decoded.
pub fn pdf_text(bytes: &[u8]) -> std::result::Result<String, String> {
    if !bytes.starts_with(b"%PDF-") {
        return Err("missing %PDF header".to_string());
    }
    if find(bytes, b"/Encrypt", 0).is_some() {
        return Err("encrypted PDFs are not supported".to_string());
    }

    let mut out = String::new();
    let mut content_streams = 0;
    for (dict, data) in pdf_streams(bytes) {
        if find(dict, b"/Image", 0).is_some() {
            continue;
        }

        let decoded = if find(dict, b"/FlateDecode", 0).is_some() {
            let mut inflated = Vec::new();
            match ZlibDecoder::new(data).read_to_end(&mut inflated) {
                Ok(_) => inflated,
                Err(_) if !inflated.is_empty() => inflated,
                Err(e) => {
                    debug!(error = %e, "skipping undecodable pdf stream");
                    continue;
                }
            }
        } else if find(dict, b"/Filter", 0).is_some() {
            continue;
        } else {
            data.to_vec()
        };

        if find(&decoded, b"BT", 0).is_none() {
            continue;
        }
        content_streams += 1;
        ContentLexer::new(&decoded).collect_text(&mut out);
        separate(&mut out, '\n');
    }

    debug!(content_streams, "scanned pdf content streams");
    if out.trim().is_empty() {
        return Err("no extractable text (scanned or image-only PDF?)".to_string());
    }
    Ok(out)
}

/// (dictionary, raw data) of every `stream ... endstream` section
fn pdf_streams(bytes: &[u8]) -> Vec<(&[u8], &[u8])> {
    let mut streams = Vec::new();
    let mut pos = 0;

    while let Some(at) = find(bytes, b"stream", pos) {
        if at >= 3 && &bytes[at - 3..at] == b"end" {
            pos = at + 6;
            continue;
        }

        let mut start = at + 6;
        if bytes.get(start) == Some(&b'\r') {
            start += 1;
        }
        if bytes.get(start) == Some(&b'\n') {
            start += 1;
        }
        let Some(end) = find(bytes, b"endstream", start) else {
            break;
        };

        let dict_from = rfind(&bytes[..at], b"obj").map_or(0, |p| p + 3);
        streams.push((&bytes[dict_from..at], &bytes[start..end]));
        pos = end + 9;
    }

    streams
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn separate(out: &mut String, sep: char) {
    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
        out.push(sep);
    }
}

/// TJ offsets below this (in thousandths of an em) read as a word gap
const TJ_SPACE_THRESHOLD: f64 = -180.0;

#[derive(Debug, Clone, PartialEq)]
enum Lexeme<'a> {
    Str(Vec<u8>),
    Num(f64),
    ArrayStart,
    ArrayEnd,
    Keyword(&'a [u8]),
    Other,
}

struct ContentLexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ContentLexer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn collect_text(&mut self, out: &mut String) {
        let mut operands: Vec<Lexeme> = Vec::new();
        let mut array: Option<Vec<Lexeme>> = None;

        while let Some(lexeme) = self.next_lexeme() {
            match lexeme {
                Lexeme::ArrayStart => array = Some(Vec::new()),
                Lexeme::ArrayEnd => {
                    if let Some(items) = array.take() {
                        operands.push(Lexeme::Str(join_array(items)));
                    }
                }
                Lexeme::Keyword(op) if array.is_none() => {
                    self.apply(op, &operands, out);
                    operands.clear();
                }
                other => match array.as_mut() {
                    Some(items) => items.push(other),
                    None => operands.push(other),
                },
            }
        }
    }

    fn apply(&self, op: &[u8], operands: &[Lexeme], out: &mut String) {
        match op {
            b"Tj" | b"TJ" => {
                if let Some(Lexeme::Str(bytes)) = operands.last() {
                    out.push_str(&decode_pdf_string(bytes));
                }
            }
            b"'" | b"\"" => {
                separate(out, '\n');
                if let Some(Lexeme::Str(bytes)) = operands.last() {
                    out.push_str(&decode_pdf_string(bytes));
                }
            }
            b"Td" | b"TD" | b"Tm" | b"T*" => separate(out, ' '),
            b"ET" => separate(out, '\n'),
            _ => {}
        }
    }

    fn next_lexeme(&mut self) -> Option<Lexeme<'a>> {
        loop {
            let b = *self.data.get(self.pos)?;
            match b {
                b if b.is_ascii_whitespace() => self.pos += 1,
                b'%' => {
                    while self.pos < self.data.len() && !matches!(self.data[self.pos], b'\n' | b'\r') {
                        self.pos += 1;
                    }
                }
                b'(' => return Some(Lexeme::Str(self.literal_string())),
                b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                    self.pos += 2;
                    return Some(Lexeme::Other);
                }
                b'<' => return Some(Lexeme::Str(self.hex_string())),
                b'>' => {
                    self.pos += if self.data.get(self.pos + 1) == Some(&b'>') { 2 } else { 1 };
                    return Some(Lexeme::Other);
                }
                b'[' => {
                    self.pos += 1;
                    return Some(Lexeme::ArrayStart);
                }
                b']' => {
                    self.pos += 1;
                    return Some(Lexeme::ArrayEnd);
                }
                b'/' => {
                    self.pos += 1;
                    self.word();
                    return Some(Lexeme::Other);
                }
                b'0'..=b'9' | b'-' | b'+' | b'.' => {
                    let word = self.word();
                    let num = std::str::from_utf8(word).ok().and_then(|s| s.parse().ok());
                    return Some(num.map_or(Lexeme::Other, Lexeme::Num));
                }
                b'{' | b'}' | b')' => {
                    self.pos += 1;
                    return Some(Lexeme::Other);
                }
                _ => {
                    let word = self.word();
                    if word.is_empty() {
                        self.pos += 1;
                        continue;
                    }
                    if word == b"ID" {
                        self.skip_to_end_image();
                    }
                    return Some(Lexeme::Keyword(word));
                }
            }
        }
    }

    fn word(&mut self) -> &'a [u8] {
        let start = self.pos;
        while let Some(&b) = self.data.get(self.pos) {
            if b.is_ascii_whitespace() || b"()<>[]{}/%".contains(&b) {
                break;
            }
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    fn skip_to_end_image(&mut self) {
        match find(self.data, b"EI", self.pos) {
            Some(at) => self.pos = at + 2,
            None => self.pos = self.data.len(),
        }
    }

    fn literal_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 0usize;
        self.pos += 1;

        while let Some(&b) = self.data.get(self.pos) {
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' if depth == 0 => break,
                b')' => {
                    depth -= 1;
                    out.push(b);
                }
                b'\\' => {
                    let Some(&esc) = self.data.get(self.pos) else {
                        break;
                    };
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'0'..=b'7' => {
                            let mut value = (esc - b'0') as u32;
                            for _ in 0..2 {
                                match self.data.get(self.pos) {
                                    Some(&d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u32;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xff) as u8);
                        }
                        b'\r' => {
                            if self.data.get(self.pos) == Some(&b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                _ => out.push(b),
            }
        }

        out
    }

    fn hex_string(&mut self) -> Vec<u8> {
        self.pos += 1;
        let mut digits = Vec::new();
        while let Some(&b) = self.data.get(self.pos) {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if let Some(d) = (b as char).to_digit(16) {
                digits.push(d as u8);
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(0);
        }
        digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect()
    }
}

/// Flatten a TJ array: strings concatenate, wide negative kerning becomes a space
fn join_array(items: Vec<Lexeme>) -> Vec<u8> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Lexeme::Str(bytes) => out.extend(bytes),
            Lexeme::Num(n) if n < TJ_SPACE_THRESHOLD => out.push(b' '),
            _ => {}
        }
    }
    out
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xfe, 0xff]) {
        let units = utf16
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]));
        return char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    bytes.iter().map(|&b| b as char).collect()
}
