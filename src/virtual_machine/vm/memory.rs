/// Number of memory cells.
pub const MEMORY_SIZE: usize = 256;

/// Flat VM memory: [`MEMORY_SIZE`] signed cells, zeroed at VM start.
///
/// Cells persist for the whole run and are not scoped to calls. Addresses
/// outside `0..MEMORY_SIZE` are rejected, never wrapped or truncated.
pub(super) struct Memory {
    cells: [i32; MEMORY_SIZE],
}

impl Memory {
    pub(super) fn new() -> Self {
        Self {
            cells: [0; MEMORY_SIZE],
        }
    }

    /// Maps an operand to a cell index, if it is in range.
    #[inline(always)]
    pub(super) fn index(address: i32) -> Option<usize> {
        usize::try_from(address)
            .ok()
            .filter(|&idx| idx < MEMORY_SIZE)
    }

    #[inline(always)]
    pub(super) fn load(&self, address: i32) -> Option<i32> {
        Self::index(address).map(|idx| self.cells[idx])
    }

    /// Writes to a cell index obtained from [`Memory::index`].
    #[inline(always)]
    pub(super) fn store(&mut self, idx: usize, value: i32) {
        self.cells[idx] = value;
    }

    pub(super) fn as_slice(&self) -> &[i32] {
        &self.cells
    }
}
