use crate::yarisc::errors::{Error, Result};
use crate::yarisc::machine::MachineState;
use crate::yarisc::types::{is_aligned, load_word, store_word, Address, Word, WORD_SIZE};

/// Largest memory the machine can address, in bytes.
pub const MAX_MEMORY: usize = (Address::MAX as usize) + 1;

/// Main memory of the machine.
///
/// Owns a contiguous, word-aligned block of bytes, zero initialised.
///
/// Loads and stores are total functions: without strict execution an
/// out-of-range or unaligned load reads as zero and the corresponding store
/// is a no-op. Strict execution checks accesses before they reach memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Allocates the maximum size that can be addressed by the machine.
    pub fn new() -> Self {
        Self {
            data: vec![0; MAX_MEMORY],
        }
    }

    /// Allocates `size` bytes of zeroed memory.
    ///
    /// The size must be word-aligned and addressable.
    pub fn with_size(size: usize) -> Self {
        assert!(is_aligned(size), "memory size must be word-aligned");
        assert!(size <= MAX_MEMORY, "memory not addressable");

        Self {
            data: vec![0; size],
        }
    }

    /// Size of the memory in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clears the memory to all zeros.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Returns whether a word access at `address` stays within the buffer.
    pub fn in_range(&self, address: Address) -> bool {
        (address as usize) + WORD_SIZE <= self.data.len()
    }

    /// Loads the word at the given byte address.
    ///
    /// Out-of-range or unaligned loads read as zero.
    pub fn load(&self, address: Address) -> Word {
        let off = address as usize;

        if !is_aligned(off) || off + WORD_SIZE > self.data.len() {
            return 0;
        }

        load_word(&self.data[off..])
    }

    /// Stores a word at the given byte address.
    ///
    /// Out-of-range or unaligned stores are no-ops.
    pub fn store(&mut self, address: Address, value: Word) {
        let off = address as usize;

        if !is_aligned(off) || off + WORD_SIZE > self.data.len() {
            return;
        }

        store_word(&mut self.data[off..], value);
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copies a flat byte image into memory starting at address zero.
    ///
    /// Only the bytes of the image are written; the remainder of memory is
    /// left untouched, so reset the machine first for a clean load.
    pub fn load_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.data.len() {
            return Err(Error::ImageTooLarge {
                size: image.len(),
                memory: self.data.len(),
            });
        }

        self.data[..image.len()].copy_from_slice(image);

        Ok(())
    }

    /// Returns a view of the whole memory area.
    pub fn view<'a>(&'a self, state: Option<&'a MachineState>) -> MemoryView<'a> {
        MemoryView::new(&self.data, 0, state)
    }

    /// Returns a view into a subarea of the memory.
    ///
    /// `size` is trimmed to the end of memory; `off` must be word-aligned
    /// and inside the buffer.
    pub fn sub<'a>(
        &'a self,
        off: usize,
        size: usize,
        state: Option<&'a MachineState>,
    ) -> MemoryView<'a> {
        assert!(is_aligned(off), "unaligned memory view");
        assert!(off <= self.data.len(), "memory view out of range");

        let size = size.min(self.data.len() - off);

        MemoryView::new(&self.data[off..off + size], off as Address, state)
    }
}

/// Non-owning aligned view of machine memory.
///
/// Stores a word-aligned slice of the memory of the machine together with
/// the base address the slice starts at and an optional reference to the
/// machine state. The state reference is only used for visualization (the
/// memory renderer highlights addresses held in registers); the view owns
/// nothing and never mutates.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryView<'a> {
    data: &'a [u8],
    base: Address,
    state: Option<&'a MachineState>,
}

impl<'a> MemoryView<'a> {
    /// Creates a view of `data` that starts at machine address `base`.
    ///
    /// The length of the slice and the base address must be word-aligned.
    pub fn new(data: &'a [u8], base: Address, state: Option<&'a MachineState>) -> Self {
        assert!(is_aligned(data.len()), "unaligned memory view");
        assert!(is_aligned(base as usize), "unaligned memory view");

        Self { data, base, state }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Size of the view in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte address in machine memory that corresponds to the start of the view.
    pub fn base(&self) -> Address {
        self.base
    }

    pub fn state(&self) -> Option<&'a MachineState> {
        self.state
    }

    /// Byte at the given offset into the view.
    pub fn byte(&self, off: usize) -> u8 {
        self.data[off]
    }

    /// Returns a view into a subarea, trimming `size` to the end of the view.
    ///
    /// `off` must be word-aligned and inside the view.
    pub fn sub(&self, off: usize, size: usize) -> MemoryView<'a> {
        assert!(is_aligned(off), "unaligned memory view");
        assert!(off <= self.data.len(), "memory view out of range");

        let size = size.min(self.data.len() - off);

        MemoryView {
            data: &self.data[off..off + size],
            base: self.base.wrapping_add(off as Address),
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_memory_is_maximal_and_zeroed() {
        let mem = Memory::new();
        assert_eq!(mem.len(), 65536);
        assert_eq!(mem.load(0), 0);
        assert_eq!(mem.load(0xfffe), 0);
    }

    #[test]
    fn load_store_round_trip() {
        let mut mem = Memory::with_size(0x40);
        mem.store(0x10, 0xabcd);
        assert_eq!(mem.load(0x10), 0xabcd);
        assert_eq!(mem.data()[0x10], 0xcd);
        assert_eq!(mem.data()[0x11], 0xab);
    }

    #[test]
    fn out_of_range_accesses_are_total() {
        let mut mem = Memory::with_size(0x10);
        mem.store(0x10, 0xffff);
        mem.store(0x0f, 0xffff);
        assert_eq!(mem.load(0x10), 0);
        assert_eq!(mem.load(0x0f), 0);
        assert!(mem.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn image_loading_checks_capacity() {
        let mut mem = Memory::with_size(0x4);
        assert!(mem.load_image(&[1, 2, 3, 4]).is_ok());
        assert_eq!(mem.load(0), 0x0201);

        let err = mem.load_image(&[0; 5]).unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { size: 5, memory: 4 }));
    }

    #[test]
    fn clear_zeroes_everything() {
        let mut mem = Memory::with_size(0x8);
        mem.store(0x2, 0x1234);
        mem.clear();
        assert_eq!(mem.load(0x2), 0);
    }

    #[test]
    fn views_carry_base_addresses() {
        let mut mem = Memory::with_size(0x20);
        mem.store(0x10, 0xbeef);

        let view = mem.sub(0x10, 0x8, None);
        assert_eq!(view.base(), 0x10);
        assert_eq!(view.len(), 0x8);
        assert_eq!(view.byte(0), 0xef);

        let sub = view.sub(0x2, usize::MAX);
        assert_eq!(sub.base(), 0x12);
        assert_eq!(sub.len(), 0x6);
    }

    #[test]
    fn view_size_is_trimmed() {
        let mem = Memory::with_size(0x10);
        let view = mem.sub(0x8, 0x100, None);
        assert_eq!(view.len(), 0x8);
    }
}
