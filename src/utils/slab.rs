/// Dense arena with a free list.
///
/// Keys handed out by [`Slab::insert`] stay valid until removed, so other
/// structures can refer to entries by key instead of by pointer.
pub(crate) struct Slab<T> {
    items: Vec<Option<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn insert(&mut self, item: T) -> usize {
        let key = if let Some(key) = self.free.pop() {
            key
        } else {
            self.items.push(None);
            self.items.len() - 1
        };

        self.items[key] = Some(item);
        self.len += 1;

        key
    }

    pub(crate) fn remove(&mut self, key: usize) -> Option<T> {
        let item = self.items.get_mut(key)?.take()?;

        self.free.push(key);
        self.len -= 1;

        Some(item)
    }

    pub(crate) fn get(&self, key: usize) -> Option<&T> {
        self.items.get(key)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        self.items.get_mut(key)?.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(key, slot)| slot.as_ref().map(|item| (key, item)))
    }
}
