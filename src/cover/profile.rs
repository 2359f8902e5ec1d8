//! Textual coverage profiles.
//!
//! A profile is a `mode: <mode>` header followed by one line per block:
//! `file:startLine.startCol,endLine.endCol numStmt count`. Profiles fetched
//! from several instances of the same binary are merged block by block.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::util::config::CoverMode;

const MODE_PREFIX: &str = "mode: ";

/// Error reading a profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile does not start with a `mode:` line")]
    MissingMode,

    #[error("unknown profile mode `{0}`")]
    BadMode(String),

    #[error("malformed profile line {line}: `{content}`")]
    BadLine { line: usize, content: String },

    #[error("cannot merge `{found}` profile into `{expected}` profile")]
    ModeMismatch { expected: CoverMode, found: CoverMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Position {
    line: u32,
    col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BlockKey {
    file: String,
    start: Position,
    end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockCount {
    num_stmt: u32,
    count: u64,
}

/// Parsed coverage profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    mode: CoverMode,
    blocks: BTreeMap<BlockKey, BlockCount>,
}

impl Profile {
    /// Empty profile in `mode`.
    pub fn new(mode: CoverMode) -> Self {
        Profile {
            mode,
            blocks: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> CoverMode {
        self.mode
    }

    /// Number of distinct blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Parse the textual form.
    pub fn parse(text: &str) -> Result<Self, ProfileError> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines.next().ok_or(ProfileError::MissingMode)?;
        let mode = header
            .strip_prefix(MODE_PREFIX)
            .ok_or(ProfileError::MissingMode)?
            .trim();
        let mode = mode
            .parse::<CoverMode>()
            .map_err(|_| ProfileError::BadMode(mode.to_string()))?;

        let mut profile = Profile::new(mode);
        for (index, line) in lines {
            let (key, block) = parse_block(line).ok_or_else(|| ProfileError::BadLine {
                line: index + 1,
                content: line.to_string(),
            })?;
            profile.add_block(key, block);
        }
        Ok(profile)
    }

    fn add_block(&mut self, key: BlockKey, block: BlockCount) {
        let mode = self.mode;
        self.blocks
            .entry(key)
            .and_modify(|existing| {
                existing.count = match mode {
                    CoverMode::Set => u64::from(existing.count > 0 || block.count > 0),
                    CoverMode::Count | CoverMode::Atomic => existing.count.saturating_add(block.count),
                };
            })
            .or_insert(block);
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: Profile) -> Result<(), ProfileError> {
        if other.mode != self.mode {
            return Err(ProfileError::ModeMismatch {
                expected: self.mode,
                found: other.mode,
            });
        }
        for (key, block) in other.blocks {
            self.add_block(key, block);
        }
        Ok(())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", MODE_PREFIX, self.mode)?;
        for (key, block) in &self.blocks {
            writeln!(
                f,
                "{}:{}.{},{}.{} {} {}",
                key.file,
                key.start.line,
                key.start.col,
                key.end.line,
                key.end.col,
                block.num_stmt,
                block.count
            )?;
        }
        Ok(())
    }
}

fn parse_position(s: &str) -> Option<Position> {
    let (line, col) = s.split_once('.')?;
    Some(Position {
        line: line.parse().ok()?,
        col: col.parse().ok()?,
    })
}

fn parse_block(line: &str) -> Option<(BlockKey, BlockCount)> {
    let mut fields = line.trim_end().rsplitn(3, ' ');
    let count = fields.next()?.parse().ok()?;
    let num_stmt = fields.next()?.parse().ok()?;
    let (file, range) = fields.next()?.rsplit_once(':')?;
    let (start, end) = range.split_once(',')?;

    Some((
        BlockKey {
            file: file.to_string(),
            start: parse_position(start)?,
            end: parse_position(end)?,
        },
        BlockCount { num_stmt, count },
    ))
}

/// Merge the profiles of several instances into one.
///
/// Returns `None` when `profiles` is empty.
pub fn merge_profiles<I, S>(profiles: I) -> Result<Option<Profile>, ProfileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut merged: Option<Profile> = None;
    for text in profiles {
        let profile = Profile::parse(text.as_ref())?;
        match merged.as_mut() {
            Some(acc) => acc.merge(profile)?,
            None => merged = Some(profile),
        }
    }
    Ok(merged)
}
