//! Compact disk encoding of a [`CoinRecord`].
//!
//! Layout: VARINT(version), VARINT(header code), availability mask bytes,
//! each available output as a compressed amount and compressed script, then
//! VARINT(height). The header code packs the coinbase flag in bit 0, the
//! availability of outputs 0 and 1 in bits 1 and 2, and the number of
//! non-zero mask bytes above that.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use zcash_primitives::consensus::BlockHeight;

use super::CoinRecord;
use crate::{constants::MAX_SCRIPT_SIZE, error::CompressionError, transaction::TxOut};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_EQUAL: u8 = 0x87;
const OP_CHECKSIG: u8 = 0xac;

/// Script encodings 0 to 5 have a fixed payload; longer scripts are stored raw.
const SPECIAL_SCRIPTS: u64 = 6;

/// Writes `n` as a MSB base-128 VARINT with the off-by-one continuation rule.
pub fn write_varint<W: Write>(mut writer: W, mut n: u64) -> std::io::Result<()> {
    let mut tmp = [0u8; 10];
    let mut len = 0;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    for byte in tmp[..=len].iter().rev() {
        writer.write_u8(*byte)?;
    }
    Ok(())
}

/// Reads a VARINT written by [`write_varint`].
pub fn read_varint<R: Read>(mut reader: R) -> Result<u64, CompressionError> {
    let mut n: u64 = 0;
    loop {
        let byte = reader.read_u8()?;
        if n > (u64::MAX >> 7) {
            return Err(CompressionError::NonCanonical);
        }
        n = (n << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 != 0 {
            n = n.checked_add(1).ok_or(CompressionError::NonCanonical)?;
        } else {
            return Ok(n);
        }
    }
}

/// Amount compression: strips trailing decimal zeros into an exponent.
pub fn compress_amount(mut n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut e = 0;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        n /= 10;
        n.wrapping_mul(9)
            .wrapping_add(d - 1)
            .wrapping_mul(10)
            .wrapping_add(1 + e)
    } else {
        (n - 1).wrapping_mul(10).wrapping_add(10)
    }
}

/// Inverse of [`compress_amount`].
pub fn decompress_amount(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    let mut x = x - 1;
    let mut e = x % 10;
    x /= 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x.wrapping_mul(10).wrapping_add(d)
    } else {
        x.wrapping_add(1)
    };
    while e > 0 {
        n = n.wrapping_mul(10);
        e -= 1;
    }
    n
}

fn compress_script(script: &[u8]) -> Option<Vec<u8>> {
    match script {
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            Some([&[0x00u8][..], hash].concat())
        }
        [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            Some([&[0x01u8][..], hash].concat())
        }
        [33, key @ .., OP_CHECKSIG] if key.len() == 33 && (key[0] == 0x02 || key[0] == 0x03) => {
            Some(key.to_vec())
        }
        [65, key @ .., OP_CHECKSIG] if key.len() == 65 && key[0] == 0x04 => {
            secp256k1::PublicKey::from_slice(key).ok()?;
            Some([&[0x04 | (key[64] & 0x01)][..], &key[1..33]].concat())
        }
        _ => None,
    }
}

fn special_script_size(kind: u64) -> usize {
    match kind {
        0 | 1 => 20,
        _ => 32,
    }
}

fn decompress_script(kind: u64, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
    Ok(match kind {
        0x00 => [
            &[OP_DUP, OP_HASH160, 20][..],
            payload,
            &[OP_EQUALVERIFY, OP_CHECKSIG],
        ]
        .concat(),
        0x01 => [&[OP_HASH160, 20][..], payload, &[OP_EQUAL]].concat(),
        0x02 | 0x03 => [&[33, kind as u8][..], payload, &[OP_CHECKSIG]].concat(),
        _ => {
            let compressed = [&[kind as u8 - 2][..], payload].concat();
            let key = secp256k1::PublicKey::from_slice(&compressed)
                .map_err(|_| CompressionError::InvalidScript)?;
            [&[65u8][..], &key.serialize_uncompressed(), &[OP_CHECKSIG]].concat()
        }
    })
}

/// Writes one output in compressed form. Negative values are rejected.
pub fn write_txout<W: Write>(mut writer: W, txout: &TxOut) -> std::io::Result<()> {
    let value = u64::try_from(txout.value).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("negative output value {}", txout.value),
        )
    })?;
    write_varint(&mut writer, compress_amount(value))?;
    match compress_script(&txout.script_pubkey) {
        Some(compressed) => writer.write_all(&compressed),
        None => {
            write_varint(
                &mut writer,
                txout.script_pubkey.len() as u64 + SPECIAL_SCRIPTS,
            )?;
            writer.write_all(&txout.script_pubkey)
        }
    }
}

/// Reads one output written by [`write_txout`].
pub fn read_txout<R: Read>(mut reader: R) -> Result<TxOut, CompressionError> {
    let value = decompress_amount(read_varint(&mut reader)?) as i64;
    let size = read_varint(&mut reader)?;
    let script_pubkey = if size < SPECIAL_SCRIPTS {
        let mut payload = vec![0u8; special_script_size(size)];
        reader.read_exact(&mut payload)?;
        decompress_script(size, &payload)?
    } else {
        let len = size - SPECIAL_SCRIPTS;
        if len > MAX_SCRIPT_SIZE as u64 {
            return Err(CompressionError::OversizedScript(len));
        }
        let mut script = vec![0u8; len as usize];
        reader.read_exact(&mut script)?;
        script
    };
    Ok(TxOut::new(value, script_pubkey))
}

impl CoinRecord {
    /// Writes the record in its compact disk encoding. The record must not be pruned.
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let (mask_size, mask_code) = self.calc_mask_size();
        let first = self.is_available(0);
        let second = self.is_available(1);
        assert!(
            first || second || mask_code > 0,
            "cannot encode a pruned coin record"
        );
        let code = 8 * (mask_code as u64 - u64::from(!(first || second)))
            + u64::from(self.is_coinbase)
            + if first { 2 } else { 0 }
            + if second { 4 } else { 0 };

        write_varint(&mut writer, self.version as u32 as u64)?;
        write_varint(&mut writer, code)?;
        for b in 0..mask_size {
            let mut avail = 0u8;
            for i in 0..8 {
                if self.is_available((2 + b * 8 + i) as u32) {
                    avail |= 1 << i;
                }
            }
            writer.write_u8(avail)?;
        }
        for txout in self.outputs.iter().flatten() {
            write_txout(&mut writer, txout)?;
        }
        write_varint(&mut writer, u64::from(u32::from(self.height)))
    }

    /// Reads a record written by [`CoinRecord::write`].
    pub fn read<R: Read>(mut reader: R) -> Result<Self, CompressionError> {
        let version = read_varint(&mut reader)? as u32 as i32;
        let code = read_varint(&mut reader)?;
        let is_coinbase = code & 1 != 0;

        let mut available = vec![code & 2 != 0, code & 4 != 0];
        let mut mask_code = code / 8 + if code & 6 != 0 { 0 } else { 1 };
        while mask_code > 0 {
            let avail = reader.read_u8()?;
            available.extend((0..8).map(|i| avail & (1 << i) != 0));
            if avail != 0 {
                mask_code -= 1;
            }
        }

        let mut outputs = Vec::with_capacity(available.len());
        for is_available in available {
            outputs.push(if is_available {
                Some(read_txout(&mut reader)?)
            } else {
                None
            });
        }

        let height = u32::try_from(read_varint(&mut reader)?)
            .map_err(|_| CompressionError::HeightOutOfRange)?;

        let mut coins = CoinRecord {
            is_coinbase,
            outputs,
            height: BlockHeight::from_u32(height),
            version,
        };
        coins.cleanup();
        Ok(coins)
    }
}
