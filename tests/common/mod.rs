// Toy host runtime shared by the integration suites: composite content
// behind cheap handles, with per-handle pin accounting.
//
// Pins are tracked per handle id; unpinning a handle that holds no pins
// panics, so any unbalanced pin/unpin in the map under test fails fast.

#![allow(dead_code)]

use pin_hashmap::{HostValue, Unhashable};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
enum Content {
    Int(i64),
    Text(String),
    Seq(Vec<Handle>),
    Opaque,
}

#[derive(Clone, Default)]
pub struct Heap {
    inner: Rc<HeapInner>,
}

#[derive(Default)]
struct HeapInner {
    pins: RefCell<HashMap<usize, usize>>,
    next_id: Cell<usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self, content: Content) -> Handle {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        Handle {
            id,
            content: Rc::new(content),
            heap: self.clone(),
        }
    }

    pub fn int(&self, n: i64) -> Handle {
        self.alloc(Content::Int(n))
    }

    pub fn text(&self, s: &str) -> Handle {
        self.alloc(Content::Text(s.to_owned()))
    }

    pub fn seq(&self, items: Vec<Handle>) -> Handle {
        self.alloc(Content::Seq(items))
    }

    pub fn opaque(&self) -> Handle {
        self.alloc(Content::Opaque)
    }

    pub fn pin_count(&self, h: &Handle) -> usize {
        self.inner.pins.borrow().get(&h.id).copied().unwrap_or(0)
    }

    pub fn total_pins(&self) -> usize {
        self.inner.pins.borrow().values().sum()
    }
}

#[derive(Clone)]
pub struct Handle {
    id: usize,
    content: Rc<Content>,
    heap: Heap,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?}", self.id, self.content)
    }
}

impl HostValue for Handle {
    fn write_canonical(&self, out: &mut Vec<u8>) -> Result<(), Unhashable> {
        match &*self.content {
            Content::Int(n) => {
                out.push(0);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Content::Text(s) => {
                out.push(1);
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Content::Seq(items) => {
                out.push(2);
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.write_canonical(out)?;
                }
            }
            Content::Opaque => return Err(Unhashable),
        }
        Ok(())
    }

    fn structural_eq(&self, other: &Self) -> bool {
        match (&*self.content, &*other.content) {
            (Content::Int(a), Content::Int(b)) => a == b,
            (Content::Text(a), Content::Text(b)) => a == b,
            (Content::Seq(a), Content::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y))
            }
            (Content::Opaque, Content::Opaque) => self.id == other.id,
            _ => false,
        }
    }

    fn pin(&self) {
        *self.heap.inner.pins.borrow_mut().entry(self.id).or_insert(0) += 1;
    }

    fn unpin(&self) {
        let mut pins = self.heap.inner.pins.borrow_mut();
        let n = pins
            .get_mut(&self.id)
            .expect("unpin of a handle that holds no pins");
        *n -= 1;
        if *n == 0 {
            pins.remove(&self.id);
        }
    }

    fn sequence_of(items: &[Self]) -> Self {
        let heap = items
            .first()
            .expect("sequence_of is only invoked with items")
            .heap
            .clone();
        heap.seq(items.to_vec())
    }
}
