use std::{
    io,
    ops::Range,
    path::{Path, PathBuf},
};

use regex::Regex;
use thiserror::Error;

pub mod kmp;

use kmp::{Finder, InvalidArgument, Mode};

/// Occurrences of a needle across a directory tree.
pub struct Matches {
    pub files: Vec<FileMatch>,
}

pub struct FileMatch {
    pub path: PathBuf,
    occurrences: Vec<Occurrence>,
}

impl FileMatch {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            occurrences: vec![],
        }
    }

    fn push(&mut self, occurrence: Occurrence) {
        self.occurrences.push(occurrence)
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    pub fn file_occurrences(&self) -> impl Iterator<Item = FileOccurrence> + '_ {
        self.occurrences.iter().map(|occurrence| FileOccurrence {
            file: &self.path,
            occurrence,
        })
    }

    pub fn read_content(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}

impl Matches {
    /// Walks `root`, honoring ignore files, and searches every file whose
    /// path matches `filter` (all files when `None`).
    pub fn collect(
        finder: &Finder<u8>,
        root: impl AsRef<Path>,
        filter: Option<&Regex>,
        mode: Mode,
    ) -> Result<Self, SearchError> {
        if finder.needle().contains(&b'\n') {
            return Err(SearchError::MultiLineNeedle);
        }
        let matcher = Matcher { finder };
        let mut files = vec![];
        for result in ignore::Walk::new(root) {
            let dir = result?;

            let Some(file_type) = dir.file_type() else {
                continue;
            };

            if !file_type.is_file() {
                continue;
            }

            let path = dir.path();
            if let Some(re) = filter {
                if !re.is_match(&path.to_string_lossy()) {
                    continue;
                }
            }

            let mut file = FileMatch::new(path);
            let mut searcher = grep::searcher::SearcherBuilder::new()
                .line_number(true)
                .binary_detection(grep::searcher::BinaryDetection::quit(b'\x00'))
                .build();
            searcher.search_path(
                &matcher,
                path,
                Sink(|line_number, byte_offset, line: &[u8]| {
                    for idx in finder.find_iter(line)? {
                        file.push(Occurrence {
                            byte_offset: byte_offset as usize + idx,
                            line_number,
                            len: finder.needle().len(),
                        });
                        if mode == Mode::First {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }),
            )?;
            if !file.occurrences.is_empty() {
                files.push(file);
            }
        }
        Ok(Self { files })
    }

    /// Iterator over every occurrence, file by file.
    pub fn occurrences(&self) -> impl Iterator<Item = FileOccurrence> + '_ {
        self.files.iter().flat_map(|file| file.file_occurrences())
    }

    pub fn count(&self) -> usize {
        self.files.iter().map(|file| file.occurrences.len()).sum()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// The offset in bytes from the beginning of the file to the start of the match
    pub byte_offset: usize,
    pub line_number: Option<u64>,
    len: usize,
}

impl Occurrence {
    pub fn span(&self) -> Range<usize> {
        self.byte_offset..self.byte_offset + self.len
    }
}

/// An occurrence together with the file it was found in
#[derive(Copy, Clone)]
pub struct FileOccurrence<'a> {
    file: &'a Path,
    occurrence: &'a Occurrence,
}

impl FileOccurrence<'_> {
    pub fn span(&self) -> Range<usize> {
        self.occurrence.span()
    }

    pub fn file(&self) -> &Path {
        self.file
    }

    pub fn line_number(&self) -> Option<u64> {
        self.occurrence.line_number
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// Search is line oriented so a needle may not span lines.
    #[error("the needle must not contain a newline")]
    MultiLineNeedle,
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

struct Matcher<'a> {
    finder: &'a Finder<u8>,
}

struct Sink<F>(pub F)
where
    F: FnMut(Option<u64>, u64, &[u8]) -> Result<bool, InvalidArgument>;

impl<F> grep::searcher::Sink for Sink<F>
where
    F: FnMut(Option<u64>, u64, &[u8]) -> Result<bool, InvalidArgument>,
{
    type Error = io::Error;

    fn matched(
        &mut self,
        _searcher: &grep::searcher::Searcher,
        mat: &grep::searcher::SinkMatch<'_>,
    ) -> Result<bool, Self::Error> {
        (self.0)(mat.line_number(), mat.absolute_byte_offset(), mat.bytes())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
    }
}

impl grep::matcher::Matcher for &Matcher<'_> {
    type Captures = grep::matcher::NoCaptures;

    type Error = InvalidArgument;

    fn find_at(
        &self,
        haystack: &[u8],
        at: usize,
    ) -> Result<Option<grep::matcher::Match>, Self::Error> {
        if at >= haystack.len() {
            return Ok(None);
        }
        let len = self.finder.needle().len();
        let found = self.finder.find(&haystack[at..])?;
        Ok(found.map(|idx| grep::matcher::Match::new(at + idx, at + idx + len)))
    }

    fn new_captures(&self) -> Result<Self::Captures, Self::Error> {
        Ok(grep::matcher::NoCaptures::new())
    }

    fn line_terminator(&self) -> Option<grep::matcher::LineTerminator> {
        Some(grep::matcher::LineTerminator::byte(b'\n'))
    }
}
