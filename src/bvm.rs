//! The persisted module format.
//!
//! | Field       | Size        |
//! |-------------|-------------|
//! | magic       | `"BVM\0"`   |
//! | entry point | u32         |
//! | code size   | u32         |
//! | data size   | u32         |
//! | code        | code size   |
//! | data        | data size   |
//!
//! All integers are little-endian, with no padding.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::region::{Module, Region};

pub const MAGIC: [u8; 4] = *b"BVM\0";

const HEADER_LEN: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("cannot open {}: {source}", path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("bad magic")]
  BadMagic,

  #[error("truncated header")]
  TruncatedHeader,

  #[error("truncated payload")]
  TruncatedPayload,

  #[error("cannot write module: {0}")]
  Write(#[from] io::Error),
}

/// Serialize `module` into its file representation.
pub fn encode<R: Region>(module: &R) -> Vec<u8> {
  let (code, data) = (module.code(), module.data());
  let mut bytes = Vec::with_capacity(MAGIC.len() + HEADER_LEN + code.len() + data.len());
  bytes.extend_from_slice(&MAGIC);
  bytes.extend_from_slice(&module.entry_point().to_le_bytes());
  bytes.extend_from_slice(&(code.len() as u32).to_le_bytes());
  bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
  bytes.extend_from_slice(code);
  bytes.extend_from_slice(data);
  bytes
}

/// Read one module from `reader`.
pub fn decode<R: Read>(mut reader: R) -> Result<Module, Error> {
  let mut magic = [0u8; 4];
  if read_full(&mut reader, &mut magic) != magic.len() || magic != MAGIC {
    return Err(Error::BadMagic);
  }

  let mut header = [0u8; HEADER_LEN];
  if read_full(&mut reader, &mut header) != HEADER_LEN {
    return Err(Error::TruncatedHeader);
  }
  let field = |index: usize| {
    let start = index * 4;
    u32::from_le_bytes([
      header[start],
      header[start + 1],
      header[start + 2],
      header[start + 3],
    ])
  };
  let (entry_point, code_size, data_size) = (field(0), field(1), field(2));

  let code = read_section(&mut reader, code_size)?;
  let data = read_section(&mut reader, data_size)?;
  Ok(Module::new(entry_point, code, data))
}

/// Write `module` to `path`, replacing any existing file.
pub fn save<R: Region>(path: impl AsRef<Path>, module: &R) -> Result<(), Error> {
  let path = path.as_ref();
  let file = File::create(path).map_err(|source| Error::Open {
    path: path.to_path_buf(),
    source,
  })?;
  let mut writer = BufWriter::new(file);
  writer.write_all(&encode(module))?;
  writer.flush()?;
  tracing::debug!(
    path = %path.display(),
    code = module.code().len(),
    data = module.data().len(),
    "saved module"
  );
  Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<Module, Error> {
  let path = path.as_ref();
  let file = File::open(path).map_err(|source| Error::Open {
    path: path.to_path_buf(),
    source,
  })?;
  let module = decode(BufReader::new(file))?;
  tracing::debug!(
    path = %path.display(),
    code = module.code().len(),
    data = module.data().len(),
    "loaded module"
  );
  Ok(module)
}

// Sizes come from the file, so buffers only grow as bytes actually arrive.
fn read_section<R: Read>(reader: &mut R, size: u32) -> Result<Vec<u8>, Error> {
  let mut section = Vec::new();
  let read = reader
    .by_ref()
    .take(u64::from(size))
    .read_to_end(&mut section)
    .map_err(|_| Error::TruncatedPayload)?;
  if read != size as usize {
    return Err(Error::TruncatedPayload);
  }
  Ok(section)
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> usize {
  let mut filled = 0;
  while filled < buf.len() {
    match reader.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(_) => break,
    }
  }
  filled
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Module {
    Module::new(3, vec![0x00, 0x0B, 0x00, 0x00], vec![0xAA, 0xBB])
  }

  #[test]
  fn layout_is_little_endian() {
    #[rustfmt::skip]
    let expected = vec![
      b'B', b'V', b'M', 0x00,
      0x03, 0x00, 0x00, 0x00,
      0x04, 0x00, 0x00, 0x00,
      0x02, 0x00, 0x00, 0x00,
      0x00, 0x0B, 0x00, 0x00,
      0xAA, 0xBB,
    ];
    assert_eq!(encode(&sample()), expected);
  }

  #[test]
  fn decode_restores_module() {
    let module = sample();
    assert_eq!(decode(encode(&module).as_slice()).unwrap(), module);
    let empty = Module::default();
    assert_eq!(decode(encode(&empty).as_slice()).unwrap(), empty);
  }

  #[test]
  fn bad_magic() {
    let mut bytes = encode(&sample());
    bytes[3] = b'!';
    assert!(matches!(decode(bytes.as_slice()), Err(Error::BadMagic)));
    assert!(matches!(decode(&b"BV"[..]), Err(Error::BadMagic)));
  }

  #[test]
  fn truncated_header() {
    let bytes = encode(&sample());
    assert!(matches!(
      decode(&bytes[..MAGIC.len() + 11]),
      Err(Error::TruncatedHeader)
    ));
  }

  #[test]
  fn truncated_payload() {
    let bytes = encode(&sample());
    assert!(matches!(
      decode(&bytes[..bytes.len() - 1]),
      Err(Error::TruncatedPayload)
    ));
    assert!(matches!(
      decode(&bytes[..MAGIC.len() + HEADER_LEN + 2]),
      Err(Error::TruncatedPayload)
    ));
  }

  #[test]
  fn oversized_declaration_does_not_allocate() {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.push(0x00);
    assert!(matches!(decode(bytes.as_slice()), Err(Error::TruncatedPayload)));
  }

  #[test]
  fn open_failure_names_the_path() {
    let err = load("/definitely/not/here.bvm").unwrap_err();
    assert!(matches!(err, Error::Open { .. }));
    assert!(err.to_string().contains("/definitely/not/here.bvm"));
  }
}
