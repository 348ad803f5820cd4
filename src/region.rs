/// A loadable program image: a code region followed by a data region.
pub trait Region {
  fn entry_point(&self) -> u32;
  fn code(&self) -> &[u8];
  fn data(&self) -> &[u8];

  /// Code bytes then data bytes, the flat memory the virtual machine runs on.
  fn memory_image(&self) -> Vec<u8> {
    let mut image = Vec::with_capacity(self.code().len() + self.data().len());
    image.extend_from_slice(self.code());
    image.extend_from_slice(self.data());
    image
  }
}

/// A `Module` is the output of the assembler and the input of the virtual
/// machine. It is never modified once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
  entry_point: u32,
  code: Vec<u8>,
  data: Vec<u8>,
}

impl Module {
  pub fn new(entry_point: u32, code: Vec<u8>, data: Vec<u8>) -> Self {
    Self {
      entry_point,
      code,
      data,
    }
  }
}

impl Region for Module {
  fn entry_point(&self) -> u32 {
    self.entry_point
  }

  fn code(&self) -> &[u8] {
    &self.code
  }

  fn data(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn memory_image_places_data_after_code() {
    let module = Module::new(1, vec![0x0, 0xB], vec![0xAA, 0xBB, 0xCC]);
    assert_eq!(module.memory_image(), vec![0x0, 0xB, 0xAA, 0xBB, 0xCC]);
    assert_eq!(module.entry_point(), 1);
  }
}
