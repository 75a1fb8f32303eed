use crate::plat::{is_value, Word, MEMORY_SIZE};

use super::{EmuError, EmuResult};

/// The machine's word-addressed main memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Ram {
    pub memory: Box<[Word]>,
}

impl Ram {
    /// Creates a new [`Ram`] instance, allocating and initializing its memory to [0u16; 32768].
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    /// Builds a memory image from little-endian encoded words, zero-filling the rest.
    ///
    /// # Errors
    ///
    /// Returns [`EmuError::ImageTooLarge`] if the image holds more than 32768 words.
    pub fn from_image(bytes: &[u8]) -> EmuResult<Self> {
        let words = words_from_le_bytes(bytes);
        let mut this = Self::new();
        this.load_words(&words)?;
        Ok(this)
    }

    /// Copies `words` to the start of memory.
    pub fn load_words(&mut self, words: &[Word]) -> EmuResult<()> {
        if words.len() > MEMORY_SIZE {
            return Err(EmuError::ImageTooLarge(words.len()));
        }
        self.memory[..words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Reads the word at `addr`, which must be a plain value.
    pub fn read(&self, addr: Word) -> EmuResult<Word> {
        if !is_value(addr) {
            return Err(EmuError::OperandOutOfRange(addr));
        }
        Ok(self.memory[addr as usize])
    }

    /// Writes `value` at `addr`, which must be a plain value.
    pub fn write(&mut self, addr: Word, value: Word) -> EmuResult<()> {
        if !is_value(addr) {
            return Err(EmuError::OperandOutOfRange(addr));
        }
        self.memory[addr as usize] = value;
        Ok(())
    }

    /// Mutable access to the cell at `addr`.
    pub fn cell_mut(&mut self, addr: Word) -> EmuResult<&mut Word> {
        self.memory
            .get_mut(addr as usize)
            .ok_or(EmuError::OperandOutOfRange(addr))
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.memory.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        f.debug_struct("Ram").field("used", &used).finish()
    }
}

/// Decodes little-endian words. A trailing odd byte becomes the low byte of a final word.
pub fn words_from_le_bytes(bytes: &[u8]) -> Vec<Word> {
    let chunks = bytes.chunks_exact(2);
    let rest = chunks.remainder();
    let mut words: Vec<Word> = chunks.map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    if let [lo] = rest {
        words.push(*lo as Word);
    }
    words
}

/// Encodes words as little-endian bytes.
pub fn words_to_le_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_load() {
        let ram = Ram::from_image(&[9, 0, 0, 128, 60, 0]).unwrap();
        assert_eq!(&ram.memory[..4], &[9, 32768, 60, 0]);
    }

    #[test]
    fn test_odd_trailing_byte() {
        assert_eq!(words_from_le_bytes(&[1, 0, 7]), vec![1, 7]);
    }

    #[test]
    fn test_image_too_large() {
        let bytes = vec![0u8; (MEMORY_SIZE + 1) * 2];
        assert!(matches!(
            Ram::from_image(&bytes),
            Err(EmuError::ImageTooLarge(n)) if n == MEMORY_SIZE + 1
        ));
        assert!(Ram::from_image(&vec![0u8; MEMORY_SIZE * 2]).is_ok());
    }

    #[test]
    fn test_out_of_range_access() {
        let mut ram = Ram::new();
        assert!(ram.write(32767, 5).is_ok());
        assert_eq!(ram.read(32767).unwrap(), 5);
        assert!(matches!(ram.read(32768), Err(EmuError::OperandOutOfRange(32768))));
        assert!(ram.write(40000, 1).is_err());
    }
}
