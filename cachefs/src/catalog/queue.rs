use super::arena::{Arena, Key};

/// Intrusive doubly-linked-list pointers embedded in a queue member.
///
/// A [`crate::catalog::entry::CacheEntry`] carries one of these per queue it
/// can belong to (hot, cold), so the same entry can be cross-linked into
/// both at once (a "ghost").
#[derive(Default, Clone, Copy)]
pub struct Link {
    pub prev: Option<Key>,
    pub next: Option<Key>,
}

/// A queue over arena-allocated entries, identified only by head/tail keys.
/// Membership and per-entry links live on the entry itself, addressed via
/// the `link` accessor passed to each method.
#[derive(Default, Clone, Copy)]
pub struct Queue {
    pub head: Option<Key>,
    pub tail: Option<Key>,
}

impl Queue {
    pub fn is_tail(&self, key: Key) -> bool {
        self.tail == Some(key)
    }

    pub fn push_front<T>(
        &mut self,
        arena: &mut Arena<T>,
        key: Key,
        link: fn(&mut T) -> &mut Link,
    ) {
        let old_head = self.head;
        {
            let l = link(arena.get_mut(key).expect("key present in arena"));
            l.prev = None;
            l.next = old_head;
        }
        if let Some(head) = old_head {
            link(arena.get_mut(head).expect("head present in arena")).prev = Some(key);
        }
        self.head = Some(key);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }

    pub fn remove<T>(&mut self, arena: &mut Arena<T>, key: Key, link: fn(&mut T) -> &mut Link) {
        let (prev, next) = {
            let l = link(arena.get_mut(key).expect("key present in arena"));
            (l.prev, l.next)
        };

        match prev {
            Some(p) => link(arena.get_mut(p).expect("prev present in arena")).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => link(arena.get_mut(n).expect("next present in arena")).prev = prev,
            None => self.tail = prev,
        }

        let l = link(arena.get_mut(key).expect("key present in arena"));
        l.prev = None;
        l.next = None;
    }

    pub fn move_to_front<T>(
        &mut self,
        arena: &mut Arena<T>,
        key: Key,
        link: fn(&mut T) -> &mut Link,
    ) {
        if self.head == Some(key) {
            return;
        }
        self.remove(arena, key, link);
        self.push_front(arena, key, link);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Node {
        link: Link,
    }

    fn link(n: &mut Node) -> &mut Link {
        &mut n.link
    }

    #[test]
    fn front_back_order() {
        let mut arena = Arena::new();
        let mut q = Queue::default();

        let a = arena.insert(Node {
            link: Link::default(),
        });
        let b = arena.insert(Node {
            link: Link::default(),
        });
        let c = arena.insert(Node {
            link: Link::default(),
        });

        q.push_front(&mut arena, a, link);
        q.push_front(&mut arena, b, link);
        q.push_front(&mut arena, c, link);

        assert_eq!(q.head, Some(c));
        assert_eq!(q.tail, Some(a));
        assert!(q.is_tail(a));

        q.move_to_front(&mut arena, a, link);
        assert_eq!(q.head, Some(a));
        assert_eq!(q.tail, Some(b));

        q.remove(&mut arena, c, link);
        assert_eq!(q.head, Some(a));
        q.remove(&mut arena, a, link);
        assert_eq!(q.head, Some(b));
        assert_eq!(q.tail, Some(b));
    }
}
