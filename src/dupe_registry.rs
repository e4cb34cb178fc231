// Caps how many concurrent downloads of the same object from the same
// client this process will start at once. In-process, mutex-protected,
// fixed-capacity table; true cross-instance suppression is out of scope,
// see DESIGN.md.

use parking_lot::Mutex;
use sha1::{Digest, Sha1};

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    occupied: bool,
    digest: [u8; 20],
}

pub struct DupeRegistry {
    cap: usize,
    slots: Mutex<Vec<Slot>>,
}

impl DupeRegistry {
    pub fn new(capacity: usize) -> Self {
        DupeRegistry {
            cap: capacity,
            slots: Mutex::new(vec![Slot::default(); capacity]),
        }
    }

    pub fn digest(client_ip: &str, uri: &str) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(client_ip.as_bytes());
        hasher.update([0u8]);
        hasher.update(uri.as_bytes());
        hasher.update([0u8]);
        hasher.finalize().into()
    }

    // A zero cap disables this component entirely: always admits.
    pub fn is_disabled(&self) -> bool {
        self.cap == 0
    }

    // Releases the slot on drop, including on panics.
    pub fn try_acquire(self: &std::sync::Arc<Self>, digest: [u8; 20]) -> Option<SlotGuard> {
        if self.is_disabled() {
            return Some(SlotGuard {
                registry: self.clone(),
                index: None,
            });
        }

        let mut slots = self.slots.lock();

        let dupes = slots.iter().filter(|s| s.occupied && s.digest == digest).count();
        if dupes >= self.cap {
            return None;
        }

        match slots.iter().position(|s| !s.occupied) {
            Some(idx) => {
                slots[idx] = Slot { occupied: true, digest };
                Some(SlotGuard {
                    registry: self.clone(),
                    index: Some(idx),
                })
            }
            // Table full: admit without tracking rather than reject outright.
            None => Some(SlotGuard {
                registry: self.clone(),
                index: None,
            }),
        }
    }
}

pub struct SlotGuard {
    registry: std::sync::Arc<DupeRegistry>,
    index: Option<usize>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(idx) = self.index {
            let mut slots = self.registry.slots.lock();
            slots[idx] = Slot::default();
        }
    }
}
