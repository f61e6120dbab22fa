//! Salt-keyed reversible ref encoding.
//!
//! Refs are short human-typable hashes of a store's monotonic integer ids,
//! over the lower-hex alphabet with a minimum length of six. The mapping
//! `(salt, id) <-> ref` is total and round-tripping, so a ref is only
//! meaningful within the store whose salt produced it. The scheme is the
//! classic consistent-shuffle construction: a salt-derived alphabet
//! permutation, a lottery character keying a second permutation, and
//! guard-delimited padding up to the minimum length.

const ALPHABET: &[u8] = b"0123456789abcdef";
const SEPARATOR_POOL: &[u8] = b"cfhistu";
const MIN_LENGTH: usize = 6;
const SEP_DIV: f64 = 3.5;
const GUARD_DIV: f64 = 12.0;

/// Encoder/decoder for one store salt. Construction partitions the alphabet
/// once; encode/decode are then allocation-light.
#[derive(Debug, Clone)]
pub struct RefCoder {
    salt: Vec<u8>,
    alphabet: Vec<u8>,
    guards: Vec<u8>,
}

impl RefCoder {
    pub fn new(salt: &str) -> Self {
        let salt: Vec<u8> = salt.bytes().collect();

        let mut seps: Vec<u8> = SEPARATOR_POOL
            .iter()
            .copied()
            .filter(|c| ALPHABET.contains(c))
            .collect();
        let mut alphabet: Vec<u8> = ALPHABET
            .iter()
            .copied()
            .filter(|c| !seps.contains(c))
            .collect();

        consistent_shuffle(&mut seps, &salt);

        if seps.is_empty() || alphabet.len() as f64 / seps.len() as f64 > SEP_DIV {
            let needed = (alphabet.len() as f64 / SEP_DIV).ceil() as usize;
            if needed > seps.len() {
                let take = needed - seps.len();
                seps.extend_from_slice(&alphabet[..take]);
                alphabet.drain(..take);
            }
        }

        consistent_shuffle(&mut alphabet, &salt);

        let guard_count = (alphabet.len() as f64 / GUARD_DIV).ceil() as usize;
        let guards: Vec<u8> = if alphabet.len() < 3 {
            seps.drain(..guard_count).collect()
        } else {
            alphabet.drain(..guard_count).collect()
        };

        Self {
            salt,
            alphabet,
            guards,
        }
    }

    /// Encodes an id into its ref string.
    pub fn encode(&self, id: u64) -> String {
        let mut alphabet = self.alphabet.clone();
        let num_hash = (id % 100) as usize;
        let lottery = alphabet[num_hash % alphabet.len()];

        let mut result = vec![lottery];
        shuffle_with_lottery(&mut alphabet, lottery, &self.salt);
        result.extend(hash(id, &alphabet));

        if result.len() < MIN_LENGTH {
            let guard = self.guards[(num_hash + result[0] as usize) % self.guards.len()];
            result.insert(0, guard);
            if result.len() < MIN_LENGTH {
                let guard = self.guards[(num_hash + result[2] as usize) % self.guards.len()];
                result.push(guard);
            }
        }

        let half = alphabet.len() / 2;
        while result.len() < MIN_LENGTH {
            let previous = alphabet.clone();
            consistent_shuffle(&mut alphabet, &previous);
            let mut padded = alphabet[half..].to_vec();
            padded.extend_from_slice(&result);
            padded.extend_from_slice(&alphabet[..half]);
            result = padded;

            if result.len() > MIN_LENGTH {
                let excess = result.len() - MIN_LENGTH;
                let start = excess / 2;
                result = result[start..start + MIN_LENGTH].to_vec();
            }
        }

        result.iter().map(|&b| b as char).collect()
    }

    /// Decodes a ref back to its id. Returns `None` for strings this salt
    /// never produced.
    pub fn decode(&self, r: &str) -> Option<u64> {
        if r.is_empty() || !r.bytes().all(|b| ALPHABET.contains(&b)) {
            return None;
        }

        let bytes = r.as_bytes();
        let parts: Vec<&[u8]> = bytes
            .split(|b| self.guards.contains(b))
            .collect();
        let core = match parts.len() {
            2 | 3 => parts[1],
            _ => parts[0],
        };
        if core.len() < 2 {
            return None;
        }

        let lottery = core[0];
        let mut alphabet = self.alphabet.clone();
        shuffle_with_lottery(&mut alphabet, lottery, &self.salt);
        let id = unhash(&core[1..], &alphabet)?;

        // The guard-stripping above is only heuristic; re-encoding is the
        // source of truth.
        if self.encode(id) == r { Some(id) } else { None }
    }
}

/// Re-keys the working alphabet from the lottery character, the salt, and
/// the alphabet itself, as both encode and decode must do identically.
fn shuffle_with_lottery(alphabet: &mut [u8], lottery: u8, salt: &[u8]) {
    let mut buffer = Vec::with_capacity(1 + salt.len() + alphabet.len());
    buffer.push(lottery);
    buffer.extend_from_slice(salt);
    buffer.extend_from_slice(alphabet);
    buffer.truncate(alphabet.len());
    consistent_shuffle(alphabet, &buffer);
}

/// Deterministic salt-driven permutation.
fn consistent_shuffle(alphabet: &mut [u8], salt: &[u8]) {
    if salt.is_empty() || alphabet.len() < 2 {
        return;
    }
    let mut v = 0usize;
    let mut p = 0usize;
    let mut i = alphabet.len() - 1;
    while i > 0 {
        v %= salt.len();
        let t = salt[v] as usize;
        p += t;
        let j = (t + v + p) % i;
        alphabet.swap(i, j);
        i -= 1;
        v += 1;
    }
}

/// Base-N encodes `input` over the working alphabet, most significant digit
/// first.
fn hash(mut input: u64, alphabet: &[u8]) -> Vec<u8> {
    let base = alphabet.len() as u64;
    let mut out = Vec::new();
    loop {
        out.insert(0, alphabet[(input % base) as usize]);
        input /= base;
        if input == 0 {
            break;
        }
    }
    out
}

fn unhash(input: &[u8], alphabet: &[u8]) -> Option<u64> {
    let base = alphabet.len() as u64;
    let mut out: u64 = 0;
    for &c in input {
        let pos = alphabet.iter().position(|&a| a == c)? as u64;
        out = out.checked_mul(base)?.checked_add(pos)?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coder() -> RefCoder {
        RefCoder::new("2c35d8f4-9a61-4d29-bd27-6a1f33c0cd0e")
    }

    #[test]
    fn round_trip_small_ids() {
        let c = coder();
        for id in 1..=500u64 {
            let r = c.encode(id);
            assert_eq!(c.decode(&r), Some(id), "id {id} ref {r}");
        }
    }

    #[test]
    fn round_trip_large_ids() {
        let c = coder();
        for id in [10_000, 123_456, 9_876_543, u32::MAX as u64, u64::MAX / 7] {
            let r = c.encode(id);
            assert_eq!(c.decode(&r), Some(id), "id {id} ref {r}");
        }
    }

    #[test]
    fn refs_are_lower_hex_min_six() {
        let c = coder();
        for id in 1..=200u64 {
            let r = c.encode(id);
            assert!(r.len() >= MIN_LENGTH, "{r} too short");
            assert!(
                r.bytes().all(|b| ALPHABET.contains(&b)),
                "{r} not lower hex"
            );
        }
    }

    #[test]
    fn distinct_ids_distinct_refs() {
        let c = coder();
        let mut seen = std::collections::HashSet::new();
        for id in 1..=1000u64 {
            assert!(seen.insert(c.encode(id)));
        }
    }

    #[test]
    fn salts_change_the_mapping() {
        let a = RefCoder::new("salt-one");
        let b = RefCoder::new("salt-two");
        let differs = (1..=50u64).any(|id| a.encode(id) != b.encode(id));
        assert!(differs);
    }

    #[test]
    fn decode_rejects_garbage() {
        let c = coder();
        assert_eq!(c.decode(""), None);
        assert_eq!(c.decode("zzzzzz"), None);
        assert_eq!(c.decode("ABCDEF"), None);
    }
}
