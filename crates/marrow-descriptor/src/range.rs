use std::{collections::BTreeMap, fmt::Debug};

use marrow::util::align_up;

use crate::DescriptorCategory;

///One category's share of the heap.
///
/// Descriptors are handed out by bumping `head`. Freed blocks go into a free-list that is kept sorted and coalesced,
/// and are reused first-fit before the range bumps again. A block that is freed right below `head` lowers `head`
/// instead.
pub struct DescriptorRange {
    pub category: DescriptorCategory,
    ///Byte offset of descriptor 0 in the heap's memory.
    pub base: u64,
    ///Size of one descriptor in bytes.
    pub stride: u64,
    ///Number of descriptors in the range.
    pub capacity: u32,
    ///Number of copies of the range. One per frame in flight for uniform buffers, one otherwise.
    pub partitions: u32,
    ///Byte distance between two partitions.
    pub partition_stride: u64,

    head: u32,
    //start -> length of free blocks below `head`
    free: BTreeMap<u32, u32>,
    in_use: u32,
}

impl DescriptorRange {
    pub fn new(
        category: DescriptorCategory,
        base: u64,
        stride: u64,
        capacity: u32,
        partitions: u32,
        partition_stride: u64,
    ) -> Self {
        DescriptorRange {
            category,
            base,
            stride,
            capacity,
            partitions,
            partition_stride,
            head: 0,
            free: BTreeMap::new(),
            in_use: 0,
        }
    }

    ///Bytes covered by all partitions.
    pub fn byte_size(&self) -> u64 {
        self.partition_stride * self.partitions as u64
    }

    ///Number of descriptors that are currently allocated.
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    ///Byte offset of descriptor `index` in `partition`. `partition` has to be below [partitions](Self::partitions).
    pub fn byte_offset(&self, index: u32, partition: u32) -> u64 {
        debug_assert!(partition < self.partitions);
        self.base + partition as u64 * self.partition_stride + index as u64 * self.stride
    }

    ///Partition read by the frame in `frame_slot`. Ranges without per-frame copies have only partition 0.
    pub fn partition_of(&self, frame_slot: u32) -> u32 {
        if self.partitions == 1 { 0 } else { frame_slot }
    }

    ///Inverse of [byte_offset](Self::byte_offset). Returns the descriptor index at `byte_offset`, if the offset is the
    /// start of a descriptor within this range.
    pub fn index_at(&self, byte_offset: u64) -> Option<u32> {
        let local = byte_offset.checked_sub(self.base)?;
        if local >= self.byte_size() {
            return None;
        }
        let in_partition = local % self.partition_stride;
        if in_partition % self.stride != 0 {
            return None;
        }
        let index = in_partition / self.stride;
        if index >= self.capacity as u64 {
            return None;
        }
        Some(index as u32)
    }

    ///Allocates `count` consecutive descriptors, the first one aligned to `alignment` descriptors. Returns the first index.
    pub fn allocate(&mut self, count: u32, alignment: u32) -> Option<u32> {
        debug_assert!(count > 0);
        let alignment = alignment.max(1) as u64;

        //first fit in the free list
        let fit = self.free.iter().find_map(|(start, len)| {
            let aligned = align_up(*start as u64, alignment);
            if aligned + count as u64 <= *start as u64 + *len as u64 {
                Some((*start, *len, aligned as u32))
            } else {
                None
            }
        });

        if let Some((start, len, aligned)) = fit {
            self.free.remove(&start);
            if aligned > start {
                self.free.insert(start, aligned - start);
            }
            let end = aligned + count;
            if end < start + len {
                self.free.insert(end, start + len - end);
            }
            self.in_use += count;

            #[cfg(feature = "logging")]
            log::trace!(
                "Reusing {:?} descriptors {}..{}",
                self.category,
                aligned,
                end
            );
            return Some(aligned);
        }

        let aligned = align_up(self.head as u64, alignment);
        if aligned + count as u64 > self.capacity as u64 {
            return None;
        }
        let aligned = aligned as u32;
        if aligned > self.head {
            //alignment gap becomes reusable
            self.insert_free(self.head, aligned - self.head);
        }
        self.head = aligned + count;
        self.in_use += count;

        #[cfg(feature = "logging")]
        log::trace!(
            "Allocating {:?} descriptors {}..{}",
            self.category,
            aligned,
            self.head
        );
        Some(aligned)
    }

    ///Returns `count` descriptors starting at `start`. Returns false without changing anything, if the block was not
    /// allocated (double free, or a block of another range).
    pub fn free(&mut self, start: u32, count: u32) -> bool {
        let end = match start.checked_add(count) {
            Some(end) if count > 0 && end <= self.head => end,
            _ => return false,
        };

        let overlaps_prev = self
            .free
            .range(..=start)
            .next_back()
            .is_some_and(|(s, l)| s + l > start);
        let overlaps_next = self
            .free
            .range(start..)
            .next()
            .is_some_and(|(s, _)| *s < end);
        if overlaps_prev || overlaps_next {
            return false;
        }

        self.insert_free(start, count);
        self.in_use -= count;
        true
    }

    //Inserts a free block, merges it with its neighbours and gives it back to `head` if it touches it.
    fn insert_free(&mut self, start: u32, count: u32) {
        let mut start = start;
        let mut end = start + count;

        if let Some((&prev_start, &prev_len)) = self.free.range(..start).next_back() {
            if prev_start + prev_len == start {
                self.free.remove(&prev_start);
                start = prev_start;
            }
        }
        if let Some(&next_len) = self.free.get(&end) {
            self.free.remove(&end);
            end += next_len;
        }

        if end == self.head {
            self.head = start;
        } else {
            self.free.insert(start, end - start);
        }
    }

    ///Number of free blocks below `head`.
    pub fn free_blocks(&self) -> usize {
        self.free.len()
    }
}

impl Debug for DescriptorRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRange")
            .field("category", &self.category)
            .field("base", &self.base)
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .field("partitions", &self.partitions)
            .field("head", &self.head)
            .field("in_use", &self.in_use)
            .field("free", &self.free)
            .finish()
    }
}
