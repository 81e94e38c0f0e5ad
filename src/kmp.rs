//! Knuth-Morris-Pratt substring search.
//!
//! Searching is split in two stages. [`FailureTable::build`] preprocesses a
//! needle into a jump table once, and the matcher ([`search`], [`FindIter`])
//! scans haystacks with it in `O(needle.len() + haystack.len())` time without
//! ever moving backwards in the haystack.
//!
//! ```
//! use kmpgrep::kmp::{self, FailureTable, Mode};
//!
//! let needle = b"aa";
//! let table = FailureTable::build(needle);
//! let found = kmp::search(needle, &table, b"aaaa", Mode::All).unwrap();
//! assert_eq!(found, vec![0, 1, 2]);
//! ```

use std::ops::Index;

use thiserror::Error;

/// Value stored at index 0 of every non-empty table.
pub const SENTINEL: isize = -1;

/// The longest-proper-prefix-that-is-also-a-suffix table of a needle.
///
/// Entry `i` is the length of the longest proper prefix of `needle[..=i]`
/// that is also a suffix of it, except entry 0 which holds [`SENTINEL`]:
/// a mismatch on the first needle symbol advances the haystack instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FailureTable {
    entries: Vec<isize>,
}

impl FailureTable {
    /// Builds the table for `needle`. An empty needle yields an empty table.
    ///
    /// ```
    /// use kmpgrep::kmp::FailureTable;
    ///
    /// assert_eq!(FailureTable::build(b"abcabc").as_slice(), &[-1, 0, 0, 1, 2, 3]);
    /// assert_eq!(FailureTable::build(b"aaa").as_slice(), &[-1, 1, 2]);
    /// assert!(FailureTable::build::<u8>(&[]).is_empty());
    /// ```
    pub fn build<T: PartialEq>(needle: &[T]) -> FailureTable {
        let m = needle.len();
        if m == 0 {
            return FailureTable::default();
        }

        let mut entries = vec![0; m];
        entries[0] = SENTINEL;

        let mut i = 1;
        // Length of the prefix currently being extended, which is also the
        // index of the next candidate symbol.
        let mut c = 0;
        while i < m {
            if needle[i] == needle[c] {
                c += 1;
                entries[i] = c as isize;
                i += 1;
            } else if c > 0 {
                c = prefix_len(entries[c - 1]);
            } else {
                entries[i] = 0;
                i += 1;
            }
        }
        FailureTable { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[isize] {
        &self.entries
    }

    pub fn get(&self, i: usize) -> Option<isize> {
        self.entries.get(i).copied()
    }

    /// Where the needle pointer goes after a mismatch at needle index `k`.
    /// `None` means the sentinel was reached and the haystack must advance.
    fn fallback(&self, k: usize) -> Option<usize> {
        match k {
            0 => None,
            _ => Some(prefix_len(self.entries[k - 1])),
        }
    }

    /// Needle pointer to resume from after a complete match, so overlapping
    /// occurrences are not skipped.
    fn resume(&self) -> usize {
        match self.entries.last() {
            Some(&last) => prefix_len(last),
            None => 0,
        }
    }
}

impl Index<usize> for FailureTable {
    type Output = isize;

    fn index(&self, i: usize) -> &isize {
        &self.entries[i]
    }
}

/// Shorthand for [`FailureTable::build`].
pub fn build<T: PartialEq>(needle: &[T]) -> FailureTable {
    FailureTable::build(needle)
}

/// Index 0 stores the sentinel but the prefix it describes has length zero.
fn prefix_len(entry: isize) -> usize {
    entry.max(0) as usize
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Stop at the leftmost occurrence.
    First,
    /// Report every occurrence, overlapping ones included.
    All,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    #[error("the needle must not be empty")]
    EmptyNeedle,
    #[error("the haystack must not be empty")]
    EmptyHaystack,
    /// The table was not built from a needle of this length.
    #[error("failure table has {table} entries but the needle has {needle} symbols")]
    TableMismatch { needle: usize, table: usize },
}

fn validate<T>(needle: &[T], table: &FailureTable, haystack: &[T]) -> Result<(), InvalidArgument> {
    if needle.is_empty() {
        return Err(InvalidArgument::EmptyNeedle);
    }
    if haystack.is_empty() {
        return Err(InvalidArgument::EmptyHaystack);
    }
    if table.len() != needle.len() {
        return Err(InvalidArgument::TableMismatch {
            needle: needle.len(),
            table: table.len(),
        });
    }
    Ok(())
}

/// Searches `haystack` for `needle` using its precomputed `table`.
///
/// In [`Mode::First`] the result holds at most one position; an empty result
/// means the needle does not occur. In [`Mode::All`] every start position is
/// returned in ascending order.
pub fn search<T: PartialEq>(
    needle: &[T],
    table: &FailureTable,
    haystack: &[T],
    mode: Mode,
) -> Result<Vec<usize>, InvalidArgument> {
    let iter = FindIter::new(needle, table, haystack)?;
    Ok(match mode {
        Mode::First => iter.take(1).collect(),
        Mode::All => iter.collect(),
    })
}

/// Position of the leftmost occurrence of `needle` in `haystack`.
pub fn find<T: PartialEq>(
    needle: &[T],
    table: &FailureTable,
    haystack: &[T],
) -> Result<Option<usize>, InvalidArgument> {
    Ok(FindIter::new(needle, table, haystack)?.next())
}

/// Every start position of `needle` in `haystack`, ascending.
pub fn find_all<T: PartialEq>(
    needle: &[T],
    table: &FailureTable,
    haystack: &[T],
) -> Result<Vec<usize>, InvalidArgument> {
    search(needle, table, haystack, Mode::All)
}

/// Lazy iterator over the start positions of a needle in a haystack.
///
/// Positions come out in ascending order and include overlapping
/// occurrences. Once exhausted it stays exhausted.
#[derive(Debug, Clone)]
pub struct FindIter<'a, T> {
    needle: &'a [T],
    table: &'a FailureTable,
    haystack: &'a [T],
    /// Next haystack index to compare.
    h: usize,
    /// Number of needle symbols matched so far, ending at `h`.
    k: usize,
}

impl<'a, T: PartialEq> FindIter<'a, T> {
    pub fn new(
        needle: &'a [T],
        table: &'a FailureTable,
        haystack: &'a [T],
    ) -> Result<Self, InvalidArgument> {
        validate(needle, table, haystack)?;
        Ok(FindIter {
            needle,
            table,
            haystack,
            h: 0,
            k: 0,
        })
    }
}

impl<T: PartialEq> Iterator for FindIter<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let m = self.needle.len();
        let n = self.haystack.len();

        while self.h < n {
            while self.k < m && self.h < n && self.needle[self.k] == self.haystack[self.h] {
                self.k += 1;
                self.h += 1;
            }

            if self.k == m {
                self.k = self.table.resume();
                return Some(self.h - m);
            }

            if self.h == n {
                break;
            }

            let mut k = Some(self.k);
            while let Some(j) = k {
                if self.needle[j] == self.haystack[self.h] {
                    break;
                }
                k = self.table.fallback(j);
            }
            match k {
                Some(j) => self.k = j,
                None => {
                    self.h += 1;
                    self.k = 0;
                }
            }
        }
        None
    }
}

/// A needle bundled with its failure table, for searching many haystacks.
///
/// ```
/// use kmpgrep::kmp::Finder;
///
/// let finder = Finder::new(b"foo".to_vec()).unwrap();
/// assert_eq!(finder.find(b"baz foo quux").unwrap(), Some(4));
/// assert_eq!(finder.count(b"foofoo").unwrap(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Finder<T> {
    needle: Vec<T>,
    table: FailureTable,
}

impl<T: PartialEq> Finder<T> {
    pub fn new(needle: impl Into<Vec<T>>) -> Result<Self, InvalidArgument> {
        let needle = needle.into();
        if needle.is_empty() {
            return Err(InvalidArgument::EmptyNeedle);
        }
        let table = FailureTable::build(&needle);
        Ok(Finder { needle, table })
    }

    pub fn needle(&self) -> &[T] {
        &self.needle
    }

    pub fn table(&self) -> &FailureTable {
        &self.table
    }

    pub fn find_iter<'a>(&'a self, haystack: &'a [T]) -> Result<FindIter<'a, T>, InvalidArgument> {
        FindIter::new(&self.needle, &self.table, haystack)
    }

    pub fn search(&self, haystack: &[T], mode: Mode) -> Result<Vec<usize>, InvalidArgument> {
        search(&self.needle, &self.table, haystack, mode)
    }

    pub fn find(&self, haystack: &[T]) -> Result<Option<usize>, InvalidArgument> {
        find(&self.needle, &self.table, haystack)
    }

    pub fn find_all(&self, haystack: &[T]) -> Result<Vec<usize>, InvalidArgument> {
        find_all(&self.needle, &self.table, haystack)
    }

    pub fn count(&self, haystack: &[T]) -> Result<usize, InvalidArgument> {
        Ok(self.find_iter(haystack)?.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(needle: &[u8], haystack: &[u8]) -> Vec<usize> {
        if needle.len() > haystack.len() {
            return vec![];
        }
        (0..=haystack.len() - needle.len())
            .filter(|&p| &haystack[p..p + needle.len()] == needle)
            .collect()
    }

    fn all(needle: &str, haystack: &str) -> Vec<usize> {
        let table = build(needle.as_bytes());
        search(needle.as_bytes(), &table, haystack.as_bytes(), Mode::All).unwrap()
    }

    fn first(needle: &str, haystack: &str) -> Vec<usize> {
        let table = build(needle.as_bytes());
        search(needle.as_bytes(), &table, haystack.as_bytes(), Mode::First).unwrap()
    }

    #[test]
    fn known_tables() {
        assert_eq!(build::<u8>(b"").as_slice(), &[] as &[isize]);
        assert_eq!(build(b"a").as_slice(), &[-1]);
        assert_eq!(build(b"aa").as_slice(), &[-1, 1]);
        assert_eq!(build(b"aaa").as_slice(), &[-1, 1, 2]);
        assert_eq!(build(b"abcabc").as_slice(), &[-1, 0, 0, 1, 2, 3]);
        assert_eq!(build(b"abacabab").as_slice(), &[-1, 0, 1, 0, 1, 2, 3, 2]);
        assert_eq!(build(b"aabaaab").as_slice(), &[-1, 1, 0, 1, 2, 2, 3]);
    }

    #[test]
    fn table_prefix_is_suffix() {
        for needle in ["abcabc", "aabaaab", "abacabab", "ababababca", "zzzyzzz", "x"] {
            let needle = needle.as_bytes();
            let table = build(needle);
            assert_eq!(table.len(), needle.len());
            assert_eq!(table[0], SENTINEL);
            for i in 1..needle.len() {
                let t = table[i] as usize;
                assert!(t <= i);
                assert_eq!(needle[..t], needle[i + 1 - t..=i]);
                // No longer proper prefix is also a suffix.
                for longer in t + 1..=i {
                    assert_ne!(needle[..longer], needle[i + 1 - longer..=i]);
                }
            }
        }
    }

    #[test]
    fn overlapping_matches() {
        assert_eq!(all("aa", "aaaa"), vec![0, 1, 2]);
        assert_eq!(all("aaa", "aaaaa"), vec![0, 1, 2]);
        assert_eq!(all("aba", "ababababa"), vec![0, 2, 4, 6]);
        assert_eq!(all("aa", "aaabaabaaaaa"), vec![0, 1, 4, 7, 8, 9, 10]);
    }

    #[test]
    fn single_symbol() {
        assert_eq!(first("a", "a"), vec![0]);
        assert_eq!(all("a", "banana"), vec![1, 3, 5]);
    }

    #[test]
    fn no_occurrence() {
        assert_eq!(all("xyz", "abcabc"), Vec::<usize>::new());
        assert_eq!(first("xyz", "abcabc"), Vec::<usize>::new());
        assert_eq!(all("abcd", "abc"), Vec::<usize>::new());
        assert_eq!(all("bababa", "ababab"), Vec::<usize>::new());
    }

    #[test]
    fn mismatch_after_partial_match() {
        assert_eq!(all("aab", "aaab"), vec![1]);
        assert_eq!(all("abr", "abracadabra"), vec![0, 7]);
        assert_eq!(all("ABCDABD", "ABC ABCDAB ABCDABCDABDE"), vec![15]);
        assert_eq!(all("ab", "aab"), vec![1]);
    }

    #[test]
    fn degenerate_input() {
        let table = build(b"abc");
        assert_eq!(
            search(b"", &build::<u8>(b""), b"abc", Mode::All),
            Err(InvalidArgument::EmptyNeedle)
        );
        assert_eq!(
            search(b"abc", &table, b"", Mode::First),
            Err(InvalidArgument::EmptyHaystack)
        );
        assert_eq!(
            search(b"abcd", &table, b"abcd", Mode::All),
            Err(InvalidArgument::TableMismatch { needle: 4, table: 3 })
        );
        assert!(Finder::<u8>::new(Vec::new()).is_err());
        assert_eq!(
            InvalidArgument::TableMismatch { needle: 4, table: 3 }.to_string(),
            "failure table has 3 entries but the needle has 4 symbols"
        );
        assert_eq!(InvalidArgument::EmptyNeedle.to_string(), "the needle must not be empty");
    }

    #[test]
    fn agrees_with_brute_force() {
        let haystacks = [
            "abababbabaabbababbbabaaabab",
            "aaaaaaaaaabaaaaaaaaaa",
            "mississippi",
            "abcabcabcabd",
        ];
        let needles = ["a", "ab", "aba", "bab", "aaa", "aab", "issi", "ssi", "abcabd", "bb", "q"];
        for haystack in haystacks {
            for needle in needles {
                let expected = brute_force(needle.as_bytes(), haystack.as_bytes());
                assert_eq!(all(needle, haystack), expected, "{needle:?} in {haystack:?}");
                assert_eq!(
                    first(needle, haystack),
                    expected.into_iter().take(1).collect::<Vec<_>>()
                );
            }
        }
    }

    #[test]
    fn generic_symbols() {
        let needle = ["let", "x", "="];
        let haystack = ["let", "x", "=", "let", "x", "let", "x", "=", "1"];
        let finder = Finder::new(needle.to_vec()).unwrap();
        assert_eq!(finder.find_all(&haystack).unwrap(), vec![0, 5]);

        let chars: Vec<char> = "അഅഅ".chars().collect();
        let finder = Finder::new(vec!['അ']).unwrap();
        assert_eq!(finder.find_all(&chars).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn iterator_is_lazy_and_fused() {
        let finder = Finder::new(b"aa".to_vec()).unwrap();
        let mut it = finder.find_iter(b"aaaa").unwrap();
        assert_eq!(it.next(), Some(0));
        assert_eq!(it.next(), Some(1));
        assert_eq!(it.next(), Some(2));
        assert_eq!(it.next(), None);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn table_reused_across_threads() {
        let finder = Finder::new(b"ana".to_vec()).unwrap();
        std::thread::scope(|s| {
            let a = s.spawn(|| finder.find_all(b"banana").unwrap());
            let b = s.spawn(|| finder.count(b"ananana").unwrap());
            assert_eq!(a.join().unwrap(), vec![1, 3]);
            assert_eq!(b.join().unwrap(), 3);
        });
    }

    #[test]
    fn long_inputs() {
        let haystack = "a".repeat(10000);
        assert_eq!(all("a", &haystack), (0..10000).collect::<Vec<_>>());
        assert_eq!(all(&"a".repeat(9999), &haystack), vec![0, 1]);
    }
}
