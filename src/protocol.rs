/*!
 * RESP Command Decoder and Encoder
 *
 * This module implements the subset of the Redis Serialization Protocol
 * that command logs are written in: every entry is one array of bulk
 * strings. The decoder is incremental so a command whose framing is split
 * across arbitrary read chunks decodes exactly as if delivered whole; the
 * encoder produces the inverse framing so compacted output is itself valid
 * input to the same decoder (or to a RESP-compatible store).
 */

use crate::buffer::CmdBuffer;
use crate::error::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};

/// One decoded command: an ordered sequence of byte-string arguments.
///
/// Argument 0 is the command name. Commands are transient: the decoder
/// produces them, the aggregation engine consumes them immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// All arguments, name included, in wire order.
    pub args: Vec<Bytes>,
}

impl Command {
    /// The command name (argument 0).
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    /// Number of arguments, name included.
    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Incremental command decoder.
///
/// Feed it arbitrary chunks; it retains the unconsumed tail between calls
/// so framing may straddle chunk boundaries.
#[derive(Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw input.
    #[inline]
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Try to decode the next complete command.
    ///
    /// # Returns
    /// * `Ok(Some(cmd))` - a complete command, its bytes consumed
    /// * `Ok(None)` - need more input
    /// * `Err(...)` - malformed framing; fatal, the stream cannot be resumed
    pub fn next_command(&mut self) -> Result<Option<Command>> {
        match parse_one(&self.buf)? {
            Some((consumed, cmd)) => {
                self.buf.advance(consumed);
                Ok(Some(cmd))
            }
            None => Ok(None),
        }
    }

    /// Bytes retained but not yet consumed by a complete command.
    ///
    /// Non-zero at end of stream means the log ends mid-command.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Parse a single command from the front of `data`.
///
/// Expects `*<N>\r\n` followed by N bulk strings `$<L>\r\n<L bytes>\r\n`.
///
/// # Returns
/// * `Ok(Some((consumed_bytes, command)))` - successfully parsed command
/// * `Ok(None)` - incomplete data, need more bytes
/// * `Err(...)` - malformed framing
pub fn parse_one(data: &[u8]) -> Result<Option<(usize, Command)>> {
    if data.is_empty() {
        return Ok(None);
    }

    // A command is always a RESP array
    if data[0] != b'*' {
        return Err(Error::ExpectedArray(data[0]));
    }

    let (i, n) = read_decimal_line(&data[1..])?;
    if i == 0 {
        return Ok(None);
    }
    let mut cursor = 1 + i;

    if n <= 0 {
        return Err(Error::BadArrayLen(n));
    }

    let mut args: Vec<Bytes> = Vec::new();
    args.try_reserve_exact(n as usize)?;

    // Parse each array element (bulk strings only)
    for _ in 0..n {
        if cursor >= data.len() {
            return Ok(None); // need more data
        }

        if data[cursor] != b'$' {
            return Err(Error::ExpectedBulk(data[cursor]));
        }

        let (i2, len) = read_decimal_line(&data[cursor + 1..])?;
        if i2 == 0 {
            return Ok(None);
        }
        cursor += 1 + i2;

        if len < 0 {
            return Err(Error::BadBulkLen(len));
        }

        // Payload plus trailing CRLF, overflow-checked so a hostile length
        // prefix cannot wrap the cursor
        let need = (len as usize).checked_add(2).ok_or(Error::LengthOverflow)?;
        let end = cursor.checked_add(need).ok_or(Error::LengthOverflow)?;
        if end > data.len() {
            return Ok(None); // need more data
        }

        args.push(Bytes::copy_from_slice(&data[cursor..cursor + len as usize]));
        cursor = end;
    }

    Ok(Some((cursor, Command { args })))
}

/// Read a decimal number followed by `\r\n`.
///
/// Used for array element counts and bulk string lengths. Returns
/// `(bytes_consumed, value)`; `consumed == 0` means the line is still
/// incomplete and more input is needed.
fn read_decimal_line(s: &[u8]) -> Result<(usize, i64)> {
    let mut i = 0;
    let mut sign: i64 = 1;

    if i < s.len() && s[i] == b'-' {
        sign = -1;
        i += 1;
    }

    let start = i;
    let mut num: i64 = 0;

    while i < s.len() && s[i].is_ascii_digit() {
        num = num
            .checked_mul(10)
            .and_then(|v| v.checked_add((s[i] - b'0') as i64))
            .ok_or(Error::LengthOverflow)?;
        i += 1;
    }

    if i + 1 >= s.len() {
        // Line not terminated yet
        return Ok((0, 0));
    }

    if i == start || s[i] != b'\r' || s[i + 1] != b'\n' {
        return Err(Error::ExpectedCrlf);
    }

    Ok((i + 2, num * sign))
}

//
// RESP Command Encoders
//
// The exact inverse of the decoder grammar. Length prefixes are always
// regenerated from the argument bytes, never copied from the input.
//

/// Serialize a command given as a slice of argument byte-strings.
///
/// Writes `*<N>\r\n` then one `$<L>\r\n<bytes>\r\n` frame per argument and
/// bumps the buffer's command count.
pub fn encode_command(args: &[&[u8]], out: &mut CmdBuffer) -> Result<()> {
    write_array_header(args.len(), out)?;
    for a in args {
        write_bulk(a, out)?;
    }
    out.add_commands(1);
    Ok(())
}

/// Serialize a decoded command unchanged (the pass-through path).
pub fn encode_passthrough(cmd: &Command, out: &mut CmdBuffer) -> Result<()> {
    write_array_header(cmd.args.len(), out)?;
    for a in &cmd.args {
        write_bulk(a, out)?;
    }
    out.add_commands(1);
    Ok(())
}

/// Write an array header (`*<count>\r\n`).
fn write_array_header(n: usize, out: &mut CmdBuffer) -> Result<()> {
    out.append(b"*")?;
    out.append(n.to_string().as_bytes())?;
    out.append(b"\r\n")
}

/// Write one bulk string frame (`$<len>\r\n<data>\r\n`).
fn write_bulk(b: &[u8], out: &mut CmdBuffer) -> Result<()> {
    out.append(b"$")?;
    out.append(b.len().to_string().as_bytes())?;
    out.append(b"\r\n")?;
    out.append(b)?;
    out.append(b"\r\n")
}
