use lobbynet_proto::EndpointId;
use ringbuf::{
    HeapRb,
    traits::{Consumer, Observer, RingBuffer},
};

/// A datagram waiting to be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPacket {
    pub source: EndpointId,
    pub payload: Vec<u8>,
}

/// Fixed-capacity inbound FIFO. When full, the oldest packet is evicted.
pub struct PacketQueue {
    rb: HeapRb<PendingPacket>,
}

impl PacketQueue {
    /// `capacity` must already be a power of two (see `OnlineConfig::socket_queue_capacity`).
    pub fn new(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity.max(1)),
        }
    }

    /// Queues a packet, returning the one evicted to make room.
    pub fn push(&mut self, packet: PendingPacket) -> Option<PendingPacket> {
        self.rb.push_overwrite(packet)
    }

    pub fn pop(&mut self) -> Option<PendingPacket> {
        self.rb.try_pop()
    }

    /// Size of the next packet.
    pub fn peek_len(&self) -> Option<usize> {
        self.rb.try_peek().map(|p| p.payload.len())
    }

    pub fn len(&self) -> usize {
        self.rb.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rb.capacity().get()
    }

    pub fn clear(&mut self) {
        self.rb.clear();
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn packet(n: u16) -> PendingPacket {
        PendingPacket {
            source: EndpointId(n),
            payload: n.to_le_bytes().to_vec(),
        }
    }

    #[test]
    fn fifo_order() {
        let mut q = PacketQueue::new(4);
        q.push(packet(1));
        q.push(packet(2));
        assert_eq!(q.peek_len(), Some(2));
        assert_eq!(q.pop().unwrap().source, EndpointId(1));
        assert_eq!(q.pop().unwrap().source, EndpointId(2));
        assert!(q.pop().is_none());
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let mut q = PacketQueue::new(2);
        assert!(q.push(packet(1)).is_none());
        assert!(q.push(packet(2)).is_none());
        assert_eq!(q.push(packet(3)).unwrap().source, EndpointId(1));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().source, EndpointId(2));
    }

    proptest! {
        #[test]
        fn overflow_keeps_newest(exp in 1u32..6, extra in 1u16..20) {
            let cap = 1usize << exp;
            let mut q = PacketQueue::new(cap);
            let total = cap as u16 + extra;
            for n in 1..=total {
                q.push(packet(n));
            }
            prop_assert_eq!(q.len(), cap);
            let kept: Vec<u16> = std::iter::from_fn(|| q.pop()).map(|p| p.source.get()).collect();
            let expected: Vec<u16> = (total - cap as u16 + 1..=total).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
