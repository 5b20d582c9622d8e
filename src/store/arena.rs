use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::lock::RecordLock;

/// One stock keeping unit. Child links are arena indices rather than
/// pointers; `None` plays the role of a null child.
///
/// `id` and `price` are fixed at creation. `quantity` is the only field that
/// mutates after creation and it sits behind the record's own [`RecordLock`],
/// so sessions working on different ids never contend.
#[derive(Debug)]
struct Record {
    id: i64,
    price: i64,
    quantity: RecordLock<i64>,
    left: Option<usize>,
    right: Option<usize>,
}

/// the unbalanced binary search tree of records, slab-allocated in `slots`
#[derive(Debug, Default)]
struct Tree {
    slots: Vec<Record>,
    root: Option<usize>,
}

/// result of descending the tree looking for an id
enum Locate {
    /// exact match at this slot
    Found(usize),
    /// no match; this slot is the parent a new record would hang off
    Parent(usize),
    /// the tree is empty
    Empty,
}

impl Tree {
    /// Standard BST descent. Returns the matching slot, or the slot that
    /// would become the new record's parent. Iterative on purpose; the tree
    /// is not balanced and a sorted backing file reloads into a list.
    fn locate(&self, id: i64) -> Locate {
        let mut cur = match self.root {
            Some(root) => root,
            None => return Locate::Empty,
        };
        loop {
            let record = &self.slots[cur];
            if record.id == id {
                return Locate::Found(cur);
            }
            let next = if record.id < id { record.right } else { record.left };
            match next {
                Some(child) => cur = child,
                None => return Locate::Parent(cur),
            }
        }
    }

    /// appends a fresh record and hangs it off `parent` (or roots it)
    fn attach(&mut self, parent: Option<usize>, id: i64, quantity: i64, price: i64) -> usize {
        let slot = self.slots.len();
        self.slots.push(Record {
            id,
            price,
            quantity: RecordLock::new(quantity),
            left: None,
            right: None,
        });
        match parent {
            None => self.root = Some(slot),
            Some(p) => {
                if self.slots[p].id < id {
                    self.slots[p].right = Some(slot);
                } else {
                    self.slots[p].left = Some(slot);
                }
            }
        }
        slot
    }

    /// in-order traversal with an explicit stack, ascending by id
    fn in_order(&self) -> InOrder<'_> {
        let mut stack = Vec::new();
        push_left_spine(self, self.root, &mut stack);
        InOrder { tree: self, stack }
    }
}

fn push_left_spine(tree: &Tree, mut node: Option<usize>, stack: &mut Vec<usize>) {
    while let Some(idx) = node {
        stack.push(idx);
        node = tree.slots[idx].left;
    }
}

struct InOrder<'a> {
    tree: &'a Tree,
    stack: Vec<usize>,
}

impl<'a> Iterator for InOrder<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.stack.pop()?;
        let record = &self.tree.slots[idx];
        push_left_spine(self.tree, record.right, &mut self.stack);
        Some(record)
    }
}

/// The shared, ordered stock ledger.
///
/// `StockStore` is cheap to clone; clones share the same underlying tree, the
/// same way every worker in the pool shares one engine. The tree structure
/// (slot vector, child links, root) is guarded by a `RwLock`: lookups and
/// record-level traffic take it for read, only the creation of a brand new
/// record takes it for write. Each record's quantity is guarded separately by
/// its own [`RecordLock`], which is where reader/writer admission actually
/// happens.
#[derive(Debug, Clone, Default)]
pub struct StockStore {
    tree: Arc<RwLock<Tree>>,
}

/// outcome of an [`StockStore::insert`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// the record was created or its quantity committed
    Success,
    /// the insert would have driven a quantity negative, or removed from a
    /// non-existing id; the store is unchanged
    Failed,
}

impl StockStore {
    /// creates an empty store
    pub fn new() -> Self {
        StockStore::default()
    }

    /// Inserts `delta` units of stock `id` at `price`.
    ///
    /// If no record with `id` exists one is created with `quantity = delta`;
    /// a negative `delta` against a missing id fails without mutating
    /// anything. If the record exists, its quantity becomes
    /// `quantity + delta` unless that would be negative, in which case the
    /// insert fails and the record is left untouched. `price` is only
    /// consulted at creation.
    pub fn insert(&self, id: i64, delta: i64, price: i64) -> InsertOutcome {
        debug!(id, delta, price, "inserting");
        let mut tree = self.tree.write().unwrap();
        match tree.locate(id) {
            Locate::Found(idx) => {
                // exclusive tree access implies exclusive record access
                let quantity = tree.slots[idx].quantity.get_mut();
                if *quantity + delta < 0 {
                    debug!(id, "not enough stock left, insert failed");
                    return InsertOutcome::Failed;
                }
                *quantity += delta;
                InsertOutcome::Success
            }
            Locate::Parent(_) | Locate::Empty if delta < 0 => {
                debug!(id, "tried to remove count from non-existing record");
                InsertOutcome::Failed
            }
            Locate::Parent(parent) => {
                tree.attach(Some(parent), id, delta, price);
                InsertOutcome::Success
            }
            Locate::Empty => {
                tree.attach(None, id, delta, price);
                InsertOutcome::Success
            }
        }
    }

    /// returns true if a record with `id` exists
    pub fn contains(&self, id: i64) -> bool {
        let tree = self.tree.read().unwrap();
        matches!(tree.locate(id), Locate::Found(_))
    }

    /// Reads the current quantity of `id` under the record's reader
    /// admission, or `None` if the id is unknown. The admission is released
    /// before this returns; the value may be stale by the time the caller
    /// acts on it.
    pub fn quantity(&self, id: i64) -> Option<i64> {
        let tree = self.tree.read().unwrap();
        match tree.locate(id) {
            Locate::Found(idx) => Some(*tree.slots[idx].quantity.read()),
            _ => None,
        }
    }

    /// Adds `delta` (possibly negative) to the quantity of `id` under the
    /// record's writer admission, unconditionally. Returns the new quantity,
    /// or `None` if the id is unknown.
    pub fn adjust(&self, id: i64, delta: i64) -> Option<i64> {
        let tree = self.tree.read().unwrap();
        match tree.locate(id) {
            Locate::Found(idx) => {
                let mut quantity = tree.slots[idx].quantity.write();
                *quantity += delta;
                Some(*quantity)
            }
            _ => None,
        }
    }

    /// number of records in the store
    pub fn len(&self) -> usize {
        self.tree.read().unwrap().slots.len()
    }

    /// returns true if the store holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-order snapshot of `(id, quantity, price)` triples, ascending by id.
    ///
    /// Each record is read-locked individually while its fields are copied,
    /// so no single triple is torn by a concurrent writer. The traversal as
    /// a whole is not a point-in-time snapshot; a writer may still change a
    /// record that has not been visited yet.
    pub fn snapshot(&self) -> Vec<(i64, i64, i64)> {
        let tree = self.tree.read().unwrap();
        tree.in_order()
            .map(|record| (record.id, *record.quantity.read(), record.price))
            .collect()
    }

    /// renders the whole store as `"<id> <quantity> <price>\n"` lines,
    /// ascending by id; this is the body of the `show` response and the
    /// backing file format
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (id, quantity, price) in self.snapshot() {
            // writing into a String cannot fail
            let _ = writeln!(out, "{} {} {}", id, quantity, price);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_creates_and_updates() {
        let store = StockStore::new();
        assert_eq!(store.insert(1, 10, 5000), InsertOutcome::Success);
        assert_eq!(store.insert(5, 20, 2000), InsertOutcome::Success);
        assert_eq!(store.insert(1, 4, 5000), InsertOutcome::Success);
        assert_eq!(store.len(), 2);
        assert_eq!(store.quantity(1), Some(14));
        assert_eq!(store.quantity(5), Some(20));
    }

    #[test]
    fn negative_insert_on_missing_id_fails_without_mutation() {
        let store = StockStore::new();
        assert_eq!(store.insert(5, -1, 100), InsertOutcome::Failed);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn insert_never_commits_a_negative_quantity() {
        let store = StockStore::new();
        store.insert(2, 2, 200);
        assert_eq!(store.insert(2, -100, 200), InsertOutcome::Failed);
        assert_eq!(store.quantity(2), Some(2));
    }

    #[test]
    fn in_order_traversal_is_sorted_by_id() {
        let store = StockStore::new();
        for id in [10, 1, 5, 7, 2, 666, 3] {
            store.insert(id, 1, 100);
        }
        let ids: Vec<i64> = store.snapshot().iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 5, 7, 10, 666]);
    }

    #[test]
    fn size_counts_distinct_ids() {
        let store = StockStore::new();
        store.insert(1, 1, 10);
        store.insert(1, 1, 10);
        store.insert(2, 1, 10);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn adjust_is_unconditional() {
        let store = StockStore::new();
        store.insert(9, 5, 50);
        assert_eq!(store.adjust(9, -3), Some(2));
        assert_eq!(store.adjust(9, 100), Some(102));
        assert_eq!(store.adjust(404, 1), None);
    }

    #[test]
    fn render_matches_file_format() {
        let store = StockStore::new();
        store.insert(2, 7, 300);
        store.insert(1, 10, 5000);
        assert_eq!(store.render(), "1 10 5000\n2 7 300\n");
    }

    #[test]
    fn randomized_inserts_keep_order_invariant() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0xdecaf);
        let store = StockStore::new();
        let mut distinct = std::collections::BTreeSet::new();
        for _ in 0..500 {
            let id = rng.gen_range(0..64);
            store.insert(id, rng.gen_range(0..10), 100);
            distinct.insert(id);
        }
        let ids: Vec<i64> = store.snapshot().iter().map(|r| r.0).collect();
        let expected: Vec<i64> = distinct.into_iter().collect();
        assert_eq!(ids, expected);
    }
}
