//! Greedy chunk-matching delta encoder.
//!
//! The base is cut into fixed-size, non-overlapping chunks which are indexed by a fast hash. A
//! window of the same size is slid over the target one byte at a time; every chunk whose hash and
//! bytes equal the window becomes a [`Candidate`]. A candidate extends the chain of the window
//! exactly one chunk-width earlier when that window matched the previous chunk, so a chain is a
//! contiguous run of base chunks found contiguously in the target.
//!
//! Windows are processed in groups of `chunk_size` consecutive offsets. When a whole group fails
//! to extend any chain, the best chain of the group before it is emitted as a copy run. Whatever
//! the copy runs do not cover becomes literal insertions. Candidates are only kept for the group
//! being scanned and the one before it, so memory stays flat however long the target is.

use ahash::{AHashMap, RandomState};
use tracing::trace;

use super::{ByteRange, Delta};

/// Chunk width used by [`make_deltas`].
pub const DEFAULT_CHUNK_SIZE: usize = 3;

/// Upper bound on candidates kept per window. Highly repetitive bases (long runs of one byte)
/// would otherwise match every chunk at every offset.
const MAX_CANDIDATES_PER_WINDOW: usize = 256;

// Fixed seeds keep chunk hashing identical across processes.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Fixed-size slice of the base buffer.
#[derive(Debug, Clone)]
struct OriginChunk {
    index: usize,
    range: ByteRange,
}

/// Hypothesis that one target window equals one origin chunk. `chain_length` is the byte length
/// of the run ending at this window; it exceeds one chunk width only when the window one
/// chunk-width earlier matched the previous chunk.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    chunk: usize,
    chain_length: usize,
}

/// Target slice at one offset, with its candidates stored contiguously in the group arena.
#[derive(Debug, Clone)]
struct Window {
    range: ByteRange,
    first_candidate: usize,
    candidate_count: usize,
}

/// `chunk_size` consecutive windows sharing one candidate arena. Window `j` of a group chains
/// onto window `j` of the group before it.
#[derive(Debug, Default)]
struct WindowGroup {
    windows: Vec<Window>,
    candidates: Vec<Candidate>,
}

impl WindowGroup {
    fn clear(&mut self) {
        self.windows.clear();
        self.candidates.clear();
    }

    fn candidates_of(&self, window: usize) -> &[Candidate] {
        let w = &self.windows[window];
        &self.candidates[w.first_candidate..w.first_candidate + w.candidate_count]
    }

    /// Chain length of the candidate of `window` matched against chunk `chunk_index`. A window's
    /// candidates are pushed in ascending chunk order, at most one per chunk.
    fn chain_length_at(&self, window: usize, chunk_index: usize) -> Option<usize> {
        let candidates = self.candidates_of(window);
        candidates
            .binary_search_by_key(&chunk_index, |c| c.chunk)
            .ok()
            .map(|pos| candidates[pos].chain_length)
    }

    /// Candidate with the longest chain in `window`; the first one wins ties.
    fn best_candidate(&self, window: usize) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for &c in self.candidates_of(window) {
            if best.is_none_or(|b| c.chain_length > b.chain_length) {
                best = Some(c);
            }
        }
        best
    }

    /// Window holding the longest chain, with that chain's head candidate.
    fn longest_chain(&self) -> Option<(ByteRange, Candidate)> {
        let mut best: Option<(ByteRange, Candidate)> = None;
        for (window, w) in self.windows.iter().enumerate() {
            let Some(candidate) = self.best_candidate(window) else {
                continue;
            };
            if best.is_none_or(|(_, b)| candidate.chain_length > b.chain_length) {
                best = Some((w.range, candidate));
            }
        }
        best
    }

    fn extends_any_chain(&self, chunk_size: usize) -> bool {
        self.candidates.iter().any(|c| c.chain_length > chunk_size)
    }
}

/// Per-call encoder state. Only two window groups are alive at any time: the one being filled
/// and the one before it. A group's best chain is turned into a copy run as soon as the group
/// after it breaks every chain.
struct ChunkMatcher<'a> {
    target: &'a [u8],
    base: &'a [u8],
    chunk_size: usize,
    hasher: RandomState,
    chunks: Vec<OriginChunk>,
    chunk_map: AHashMap<u64, Vec<usize>>,
    previous: WindowGroup,
    current: WindowGroup,
    copies: Vec<Delta>,
    /// End of the last copy run; later runs are clipped to start here.
    until: usize,
    /// Most candidates held at once across both groups.
    peak_candidates: usize,
}

impl<'a> ChunkMatcher<'a> {
    fn new(target: &'a [u8], base: &'a [u8], chunk_size: usize) -> Self {
        let [k0, k1, k2, k3] = HASH_SEEDS;
        let hasher = RandomState::with_seeds(k0, k1, k2, k3);
        let mut chunks = Vec::with_capacity(base.len() / chunk_size);
        let mut chunk_map: AHashMap<u64, Vec<usize>> = AHashMap::new();
        for (index, bytes) in base.chunks_exact(chunk_size).enumerate() {
            let start = index * chunk_size;
            chunks.push(OriginChunk {
                index,
                range: ByteRange::new(start, start + chunk_size),
            });
            chunk_map.entry(hasher.hash_one(bytes)).or_default().push(index);
        }

        ChunkMatcher {
            target,
            base,
            chunk_size,
            hasher,
            chunks,
            chunk_map,
            previous: WindowGroup::default(),
            current: WindowGroup::default(),
            copies: Vec::new(),
            until: 0,
            peak_candidates: 0,
        }
    }

    /// Scan the target and return the copy runs, in target order and never overlapping.
    fn scan(&mut self) -> Vec<Delta> {
        let w = self.chunk_size;
        let groups = (self.target.len() / w).saturating_sub(1);

        for group in 0..groups {
            for j in 0..w {
                let start = group * w + j;
                self.push_window(ByteRange::new(start, start + w), j);
            }
            self.peak_candidates = self
                .peak_candidates
                .max(self.previous.candidates.len() + self.current.candidates.len());

            let coiled = group == 0 || self.current.extends_any_chain(w);
            if !coiled {
                self.flush_previous();
            }

            std::mem::swap(&mut self.previous, &mut self.current);
            self.current.clear();
        }

        self.flush_previous();
        std::mem::take(&mut self.copies)
    }

    /// Record window `j` of the current group, chaining onto window `j` of the previous group
    /// where possible.
    fn push_window(&mut self, range: ByteRange, j: usize) {
        let first_candidate = self.current.candidates.len();
        let target = self.target;
        let bytes = &target[range.start..range.end];
        let has_predecessor = j < self.previous.windows.len();

        if let Some(matches) = self.chunk_map.get(&self.hasher.hash_one(bytes)) {
            for &chunk in matches {
                if self.current.candidates.len() - first_candidate >= MAX_CANDIDATES_PER_WINDOW {
                    break;
                }
                let chunk_range = self.chunks[chunk].range;
                // hash equality only filters; the bytes decide
                if &self.base[chunk_range.start..chunk_range.end] != bytes {
                    continue;
                }

                let extended = self.chunks[chunk]
                    .index
                    .checked_sub(1)
                    .filter(|_| has_predecessor)
                    .and_then(|wanted| self.previous.chain_length_at(j, wanted));
                self.current.candidates.push(Candidate {
                    chunk,
                    chain_length: self.chunk_size + extended.unwrap_or(0),
                });
            }
        }

        self.current.windows.push(Window {
            range,
            first_candidate,
            candidate_count: self.current.candidates.len() - first_candidate,
        });
    }

    /// Emit the longest chain of the previous group as a copy run. The run starts at the
    /// earliest window of the chain that does not precede the last run, and is clipped when
    /// even its head window does.
    fn flush_previous(&mut self) {
        let Some((range, best)) = self.previous.longest_chain() else {
            return;
        };
        let w = self.chunk_size;

        // chain windows sit one chunk width apart, ending at `range`
        let chain_start = range.end - best.chain_length;
        let start = if range.start < self.until {
            range.start
        } else if chain_start >= self.until {
            chain_start
        } else {
            chain_start + (self.until - chain_start).div_ceil(w) * w
        };

        let end = range.end;
        let chunk_end = self.chunks[best.chunk].range.end;
        debug_assert!(end - start <= chunk_end);
        let mut target = ByteRange::new(start, end);
        let mut origin = ByteRange::new(chunk_end - target.len(), chunk_end);

        if target.start < self.until {
            let cut = self.until - target.start;
            if cut >= target.len() {
                return;
            }
            target.start += cut;
            origin.start += cut;
        }

        self.until = target.end;
        self.copies.push(Delta::Copy { origin, target });
    }
}

/// Compute the instructions rebuilding `target` from `base` with the default chunk width.
pub fn make_deltas(target: &[u8], base: &[u8]) -> Vec<Delta> {
    make_deltas_with_chunk_size(target, base, DEFAULT_CHUNK_SIZE)
}

/// Compute the instructions rebuilding `target` from `base`.
///
/// The result is ordered by target offset and covers `[0, target.len())` exactly once. Larger
/// `chunk_size` values trade match granularity for speed; zero is treated as one.
pub fn make_deltas_with_chunk_size(target: &[u8], base: &[u8], chunk_size: usize) -> Vec<Delta> {
    let chunk_size = chunk_size.max(1);
    let mut matcher = ChunkMatcher::new(target, base, chunk_size);
    let copies = matcher.scan();
    trace!(
        "delta of {} bytes against {}: {} copy runs, at most {} live candidates",
        target.len(),
        base.len(),
        copies.len(),
        matcher.peak_candidates
    );
    fill_with_inserts(target, copies)
}

/// Interleave `copies` with literal inserts for every target byte they leave uncovered.
fn fill_with_inserts(target: &[u8], copies: Vec<Delta>) -> Vec<Delta> {
    let mut deltas = Vec::with_capacity(copies.len() * 2 + 1);
    let mut cursor = 0;
    for copy in copies {
        let range = copy.target_range();
        if cursor < range.start {
            deltas.push(Delta::Insert {
                target: ByteRange::new(cursor, range.start),
                literal: target[cursor..range.start].to_vec(),
            });
        }
        cursor = range.end;
        deltas.push(copy);
    }
    if cursor < target.len() {
        deltas.push(Delta::Insert {
            target: ByteRange::new(cursor, target.len()),
            literal: target[cursor..].to_vec(),
        });
    }
    deltas
}

/// Share of target bytes served by copies, in `[0.0, 1.0]`. An empty target counts as fully copied.
pub fn copied_ratio(deltas: &[Delta]) -> f64 {
    let total: usize = deltas.iter().map(|d| d.target_range().len()).sum();
    if total == 0 {
        return 1.0;
    }
    let copied: usize = deltas
        .iter()
        .filter(|d| d.is_copy())
        .map(|d| d.target_range().len())
        .sum();
    copied as f64 / total as f64
}
