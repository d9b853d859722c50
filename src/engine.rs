/*!
 * Aggregation Engine
 *
 * Classifies each decoded command and either folds it into one of two
 * key/member tables (ZINCRBY scores, SADD memberships) or re-encodes it
 * straight into the output buffer. At end of stream, `finish` appends one
 * command per aggregated (key, member) pair or per aggregated key, so the
 * resulting log replays to the same state as the original.
 */

use crate::buffer::CmdBuffer;
use crate::error::{Error, Result};
use crate::protocol::{encode_command, encode_passthrough, Command};
use crate::table::{KeyMemberTable, KEY_BUCKETS, MEMBER_BUCKETS};
use log::debug;

/// Increment command name: ZINCRBY key delta member.
pub const CMD_ZINCRBY: &[u8] = b"ZINCRBY";

/// Set-insertion command name: SADD key member [member ...].
pub const CMD_SADD: &[u8] = b"SADD";

/// What the engine does with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdKind {
    /// ZINCRBY with exactly 4 arguments: accumulate into the score table.
    Incr,
    /// SADD with more than 2 arguments: record into the set table.
    SetAdd,
    /// Anything else, including wrong arities of the two names above:
    /// re-encode immediately, bytes and order preserved.
    PassThrough,
}

/// Classify a command by name (case-insensitive) and arity.
pub fn classify(cmd: &Command) -> CmdKind {
    if cmd.arity() == 4 && cmd.name().eq_ignore_ascii_case(CMD_ZINCRBY) {
        return CmdKind::Incr;
    }
    if cmd.arity() > 2 && cmd.name().eq_ignore_ascii_case(CMD_SADD) {
        return CmdKind::SetAdd;
    }
    CmdKind::PassThrough
}

/// The dual-table aggregator.
///
/// Owns the two tables and the output buffer for one run. Pass-through
/// commands land in the buffer as they arrive; aggregated commands are
/// appended once by [`Aggregator::finish`].
pub struct Aggregator {
    incr: KeyMemberTable,
    sets: KeyMemberTable,
    out: CmdBuffer,
    seen: u64,
}

impl Aggregator {
    /// Create an aggregator with the standard table sizes.
    pub fn new() -> Result<Self> {
        Self::with_table_sizes(KEY_BUCKETS, MEMBER_BUCKETS)
    }

    /// Create an aggregator with explicit table sizes (exposed so chain
    /// behavior stays testable under tiny bucket counts).
    pub fn with_table_sizes(key_buckets: usize, member_buckets: usize) -> Result<Self> {
        Ok(Self {
            incr: KeyMemberTable::with_sizes(key_buckets, member_buckets)?,
            sets: KeyMemberTable::with_sizes(key_buckets, member_buckets)?,
            out: CmdBuffer::new()?,
            seen: 0,
        })
    }

    /// Ingest one decoded command.
    ///
    /// Routing follows [`classify`]; a ZINCRBY delta that fails to parse
    /// as a float is fatal rather than silently skipped.
    pub fn ingest(&mut self, cmd: &Command) -> Result<()> {
        match classify(cmd) {
            CmdKind::Incr => {
                let delta = parse_score(&cmd.args[2])?;
                let key = self.incr.find_or_create_key(&cmd.args[1])?;
                let member = self.incr.find_or_create_member(key, &cmd.args[3])?;
                self.incr.accumulate(member, delta);
            }
            CmdKind::SetAdd => {
                let key = self.sets.find_or_create_key(&cmd.args[1])?;
                for m in &cmd.args[2..] {
                    let id = self.sets.find_or_create_member(key, m)?;
                    self.sets.touch(id);
                }
            }
            CmdKind::PassThrough => {
                encode_passthrough(cmd, &mut self.out)?;
            }
        }
        self.seen += 1;
        Ok(())
    }

    /// Total commands ingested so far.
    #[inline]
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Number of commands the two tables will emit at finalization:
    /// one per increment (key, member) pair plus one per set key.
    #[inline]
    pub fn aggregated_count(&self) -> u64 {
        self.incr.members() + self.sets.keys()
    }

    /// Finalize: append every aggregated command and return the buffer.
    ///
    /// Increment commands first, then set commands; within each table,
    /// bucket order then chain order. The order carries no meaning but is
    /// stable, so re-runs reproduce identical output.
    pub fn finish(mut self) -> Result<CmdBuffer> {
        let hint = table_output_hint(&self.incr) + table_output_hint(&self.sets);
        self.out.reserve(hint)?;

        for key in self.incr.iter_keys() {
            for m in key.iter_members() {
                let score = m.score().to_string();
                encode_command(
                    &[CMD_ZINCRBY, key.key(), score.as_bytes(), m.member()],
                    &mut self.out,
                )?;
            }
        }

        for key in self.sets.iter_keys() {
            let mut args: Vec<&[u8]> = Vec::new();
            args.try_reserve_exact(2 + key.member_count() as usize)?;
            args.push(CMD_SADD);
            args.push(key.key());
            args.extend(key.iter_members().map(|m| m.member()));
            encode_command(&args, &mut self.out)?;
        }

        debug!(
            "finalized: {} commands in, {} aggregated, {} bytes out",
            self.seen,
            self.aggregated_count(),
            self.out.len()
        );

        if self.out.commands() == 0 {
            return Err(Error::EmptyOutput);
        }
        Ok(self.out)
    }
}

/// Rough upper bound on the bytes a table emits at finalization: its
/// string data plus per-command framing overhead.
fn table_output_hint(t: &KeyMemberTable) -> usize {
    // name + score text + length prefixes fit comfortably in 64 bytes per
    // emitted member, plus a header allowance per key
    (t.str_len() + 64 * t.members() + 32 * t.keys()) as usize
}

/// Parse a ZINCRBY delta argument as a float.
fn parse_score(raw: &[u8]) -> Result<f64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| Error::BadScore(String::from_utf8_lossy(raw).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn cmd(args: &[&str]) -> Command {
        Command {
            args: args.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())).collect(),
        }
    }

    #[test]
    fn classify_matches_name_and_arity() {
        assert_eq!(classify(&cmd(&["ZINCRBY", "k", "1", "m"])), CmdKind::Incr);
        assert_eq!(classify(&cmd(&["zincrby", "k", "1", "m"])), CmdKind::Incr);
        assert_eq!(classify(&cmd(&["SADD", "k", "m"])), CmdKind::SetAdd);
        assert_eq!(classify(&cmd(&["sAdD", "k", "a", "b"])), CmdKind::SetAdd);

        // Wrong arities of the two names fall back to pass-through
        assert_eq!(classify(&cmd(&["ZINCRBY", "k", "1"])), CmdKind::PassThrough);
        assert_eq!(
            classify(&cmd(&["ZINCRBY", "k", "1", "m", "x"])),
            CmdKind::PassThrough
        );
        assert_eq!(classify(&cmd(&["SADD", "k"])), CmdKind::PassThrough);
        assert_eq!(classify(&cmd(&["GET", "k"])), CmdKind::PassThrough);
    }

    #[test]
    fn bad_score_is_fatal() {
        let mut agg = Aggregator::with_table_sizes(8, 8).unwrap();
        let err = agg.ingest(&cmd(&["ZINCRBY", "k", "notanumber", "m"])).unwrap_err();
        assert_eq!(err, Error::BadScore("notanumber".into()));
    }

    #[test]
    fn zero_delta_still_creates_the_entry() {
        let mut agg = Aggregator::with_table_sizes(8, 8).unwrap();
        agg.ingest(&cmd(&["ZINCRBY", "k", "0", "m"])).unwrap();
        assert_eq!(agg.aggregated_count(), 1);
    }

    #[test]
    fn empty_run_is_an_error() {
        let agg = Aggregator::with_table_sizes(8, 8).unwrap();
        assert_eq!(agg.finish().unwrap_err(), Error::EmptyOutput);
    }
}
