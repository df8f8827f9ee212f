/// A vector of slots that hands out stable indices and reuses freed ones.
#[derive(Debug)]
pub struct SlotMap<T> {
    head: u32,
    entries: Vec<Slot<T>>,
}
#[derive(Debug)]
enum Slot<T> {
    Occupied(T),
    /// Freed; links to the next free slot.
    Vacant(u32),
}
const END: u32 = u32::MAX;

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            head: END,
            entries: vec![],
        }
    }
    pub fn get(&mut self, i: usize) -> Option<&mut T> {
        match self.entries.get_mut(i) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }
    /// The index the next [`SlotMap::insert`] will use.
    pub fn next_idx(&self) -> usize {
        if self.head == END {
            self.entries.len()
        } else {
            self.head as usize
        }
    }
    pub fn insert(&mut self, value: T) -> usize {
        if self.head == END {
            self.entries.push(Slot::Occupied(value));
            return self.entries.len() - 1;
        }
        let i = self.head as usize;
        if let Slot::Vacant(next) = core::mem::replace(&mut self.entries[i], Slot::Occupied(value)) {
            self.head = next;
        }
        i
    }
    pub fn release(&mut self, i: usize) -> Option<T> {
        let slot = self.entries.get_mut(i)?;
        if matches!(slot, Slot::Vacant(_)) {
            return None;
        }
        match core::mem::replace(slot, Slot::Vacant(self.head)) {
            Slot::Occupied(value) => {
                self.head = i as u32;
                Some(value)
            }
            Slot::Vacant(_) => None,
        }
    }
    pub fn len(&self) -> usize {
        self.iter().count()
    }
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied(value) => Some((i, value)),
            Slot::Vacant(_) => None,
        })
    }
    pub fn keys(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }
}
