/*!
 * Two-Level Key/Member Hash Table
 *
 * A chained hash table of keys, each key owning a lazily-allocated chained
 * hash table of members. The aggregation engine keeps two independent
 * instances: one accumulating ZINCRBY scores per (key, member), one
 * recording distinct SADD members per key.
 *
 * The table is deliberately manual rather than a std `HashMap`: the chain
 * layout is what makes finalization order deterministic and is itself a
 * tested property. Bucket counts are fixed at construction; the outer table
 * is sized larger than the inner ones since member cardinality per key is
 * expected to exceed key cardinality overall.
 */

use crate::error::Result;

/// Bucket count for the outer (key) table.
pub const KEY_BUCKETS: usize = 22016;

/// Bucket count for each per-key member table.
pub const MEMBER_BUCKETS: usize = 512;

/// djb2 polynomial string hash (seed 5381, multiplier 33).
#[inline]
fn djb2(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

/// Handle to a key entry. Stable for the lifetime of the table: entries
/// are only ever appended at chain tails, never removed or reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyId {
    bucket: u32,
    slot: u32,
}

/// Handle to a member entry under a specific key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberId {
    key: KeyId,
    bucket: u32,
    slot: u32,
}

/// One distinct member under a key, with its numeric payload.
///
/// Only one payload field is meaningful per table: the increment table
/// uses `score`, the set table uses `hits` (kept for statistics, not
/// correctness).
#[derive(Debug)]
pub struct MemberEntry {
    member: Vec<u8>,
    score: f64,
    hits: u64,
}

impl MemberEntry {
    #[inline]
    pub fn member(&self) -> &[u8] {
        &self.member
    }

    #[inline]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

/// One distinct key and its member sub-table.
#[derive(Debug)]
pub struct KeyEntry {
    key: Vec<u8>,
    count: u64,
    // Allocated on first member insertion; a key never stays member-less
    // given the two command shapes that feed the table.
    members: Option<Vec<Vec<MemberEntry>>>,
}

impl KeyEntry {
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Number of distinct members recorded under this key.
    #[inline]
    pub fn member_count(&self) -> u64 {
        self.count
    }

    /// Members in bucket order, then chain (insertion) order.
    pub fn iter_members(&self) -> impl Iterator<Item = &MemberEntry> {
        self.members.iter().flatten().flatten()
    }
}

/// Chained two-level hash table: key -> member -> payload.
pub struct KeyMemberTable {
    buckets: Vec<Vec<KeyEntry>>,
    member_buckets: usize,
    keys: u64,
    members: u64,
    str_len: u64,
}

impl KeyMemberTable {
    /// Create a table with explicit bucket counts (both must be nonzero).
    pub fn with_sizes(key_buckets: usize, member_buckets: usize) -> Result<Self> {
        assert!(key_buckets > 0 && member_buckets > 0, "bucket counts must be nonzero");
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(key_buckets)?;
        buckets.resize_with(key_buckets, Vec::new);
        Ok(Self {
            buckets,
            member_buckets,
            keys: 0,
            members: 0,
            str_len: 0,
        })
    }

    /// Create a table with the standard bucket counts.
    pub fn new() -> Result<Self> {
        Self::with_sizes(KEY_BUCKETS, MEMBER_BUCKETS)
    }

    /// Find the entry for `key`, creating it if absent.
    ///
    /// Lookup compares length first, then bytes; new entries append at the
    /// chain tail.
    pub fn find_or_create_key(&mut self, key: &[u8]) -> Result<KeyId> {
        let bucket = (djb2(key) % self.buckets.len() as u64) as usize;
        let chain = &mut self.buckets[bucket];

        for (slot, entry) in chain.iter().enumerate() {
            if entry.key.len() == key.len() && entry.key == key {
                return Ok(KeyId {
                    bucket: bucket as u32,
                    slot: slot as u32,
                });
            }
        }

        let mut owned = Vec::new();
        owned.try_reserve_exact(key.len())?;
        owned.extend_from_slice(key);

        chain.try_reserve(1)?;
        chain.push(KeyEntry {
            key: owned,
            count: 0,
            members: None,
        });

        self.keys += 1;
        self.str_len += key.len() as u64;

        Ok(KeyId {
            bucket: bucket as u32,
            slot: (chain.len() - 1) as u32,
        })
    }

    /// Find the entry for `member` under `key`, creating it if absent.
    ///
    /// The member sub-table is allocated here on first use.
    pub fn find_or_create_member(&mut self, key: KeyId, member: &[u8]) -> Result<MemberId> {
        let msize = self.member_buckets;
        let entry = &mut self.buckets[key.bucket as usize][key.slot as usize];

        let table = match entry.members {
            Some(ref mut t) => t,
            None => {
                let mut t = Vec::new();
                t.try_reserve_exact(msize)?;
                t.resize_with(msize, Vec::new);
                entry.members.insert(t)
            }
        };

        let bucket = (djb2(member) % msize as u64) as usize;
        let chain = &mut table[bucket];

        for (slot, m) in chain.iter().enumerate() {
            if m.member.len() == member.len() && m.member == member {
                return Ok(MemberId {
                    key,
                    bucket: bucket as u32,
                    slot: slot as u32,
                });
            }
        }

        let mut owned = Vec::new();
        owned.try_reserve_exact(member.len())?;
        owned.extend_from_slice(member);

        chain.try_reserve(1)?;
        chain.push(MemberEntry {
            member: owned,
            score: 0.0,
            hits: 0,
        });

        entry.count += 1;
        self.members += 1;
        self.str_len += member.len() as u64;

        Ok(MemberId {
            key,
            bucket: bucket as u32,
            slot: (chain.len() - 1) as u32,
        })
    }

    /// Add `delta` to the running score (increment table).
    #[inline]
    pub fn accumulate(&mut self, id: MemberId, delta: f64) {
        self.member_mut(id).score += delta;
    }

    /// Bump the hit counter (set table). Membership itself is idempotent;
    /// the counter just records how often the pair was seen.
    #[inline]
    pub fn touch(&mut self, id: MemberId) {
        self.member_mut(id).hits += 1;
    }

    #[inline]
    fn member_mut(&mut self, id: MemberId) -> &mut MemberEntry {
        let entry = &mut self.buckets[id.key.bucket as usize][id.key.slot as usize];
        let table = entry.members.as_mut().expect("member id without sub-table");
        &mut table[id.bucket as usize][id.slot as usize]
    }

    /// Keys in bucket order, then chain (insertion) order. The order is
    /// not semantically meaningful but it is stable, which keeps repeated
    /// runs byte-for-byte reproducible.
    pub fn iter_keys(&self) -> impl Iterator<Item = &KeyEntry> {
        self.buckets.iter().flatten()
    }

    /// Number of distinct keys.
    #[inline]
    pub fn keys(&self) -> u64 {
        self.keys
    }

    /// Number of distinct (key, member) pairs.
    #[inline]
    pub fn members(&self) -> u64 {
        self.members
    }

    /// Total bytes of all stored key and member strings, used to presize
    /// the output buffer before finalization.
    #[inline]
    pub fn str_len(&self) -> u64 {
        self.str_len
    }
}
