//! Transaction wire format: build, sign, and inspect.
//!
//! # Wire Layout
//! ```text
//! transaction = compact-u16 signature count
//!             | signature slots (count × 64 bytes)
//!             | message
//! message     = [0x80 | version]?          (versioned messages only)
//!               header (3 bytes)
//!               compact-u16 key count | keys (32 bytes each)
//!               recent blockhash (32 bytes)
//!               compact-u16 instruction count | instructions
//! ```
//!
//! The first account key is always the fee payer and the first signature
//! slot belongs to it.

use crate::keys::{Address, KeySlot};
use crate::ledger::types::{Blockhash, LedgerError, LedgerResult, Signature};

/// System Program instruction index for a native transfer.
const SYSTEM_TRANSFER: u32 = 2;

const VERSION_PREFIX_MASK: u8 = 0x80;

/// Encode a compact-u16 length.
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(3);
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return out;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Decode a compact-u16 length. Returns `(value, bytes consumed)`.
pub fn decode_compact_u16(data: &[u8]) -> LedgerResult<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in data.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| LedgerError::Build("compact-u16 overflow".to_string()));
        }
    }
    Err(LedgerError::Build("truncated compact-u16".to_string()))
}

/// One account reference in a message.
#[derive(Debug, Clone, Copy)]
struct AccountMeta {
    key: Address,
    signer: bool,
    writable: bool,
}

/// One instruction, with accounts given as indices into the key list.
#[derive(Debug, Clone)]
struct CompiledInstruction {
    program_index: u8,
    accounts: Vec<u8>,
    data: Vec<u8>,
}

/// Serialize a legacy message. `accounts` must already be ordered:
/// writable signers, read-only signers, writable non-signers, read-only non-signers.
fn compile_message(
    accounts: &[AccountMeta],
    blockhash: &Blockhash,
    instructions: &[CompiledInstruction],
) -> Vec<u8> {
    let signers = accounts.iter().filter(|a| a.signer).count() as u8;
    let readonly_signed = accounts.iter().filter(|a| a.signer && !a.writable).count() as u8;
    let readonly_unsigned = accounts.iter().filter(|a| !a.signer && !a.writable).count() as u8;

    let mut message = vec![signers, readonly_signed, readonly_unsigned];

    message.extend(encode_compact_u16(accounts.len() as u16));
    for account in accounts {
        message.extend_from_slice(account.key.as_bytes());
    }

    message.extend_from_slice(blockhash.as_bytes());

    message.extend(encode_compact_u16(instructions.len() as u16));
    for ix in instructions {
        message.push(ix.program_index);
        message.extend(encode_compact_u16(ix.accounts.len() as u16));
        message.extend_from_slice(&ix.accounts);
        message.extend(encode_compact_u16(ix.data.len() as u16));
        message.extend_from_slice(&ix.data);
    }

    message
}

/// Message for a native transfer of `lamports` from `from` to `to`.
pub fn transfer_message(from: &Address, to: &Address, lamports: u64, blockhash: &Blockhash) -> Vec<u8> {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    let accounts = [
        AccountMeta {
            key: *from,
            signer: true,
            writable: true,
        },
        AccountMeta {
            key: *to,
            signer: false,
            writable: true,
        },
        AccountMeta {
            key: Address::SYSTEM_PROGRAM,
            signer: false,
            writable: false,
        },
    ];
    let ix = CompiledInstruction {
        program_index: 2,
        accounts: vec![0, 1],
        data,
    };

    compile_message(&accounts, blockhash, &[ix])
}

/// A signed, ready-to-broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
    /// The fee payer's signature, which identifies the transaction.
    pub signature: Signature,
}

/// Prefix a single-signer message with its signature.
fn assemble(signature: &[u8; 64], message: &[u8]) -> Vec<u8> {
    let mut tx = Vec::with_capacity(1 + 64 + message.len());
    tx.extend(encode_compact_u16(1));
    tx.extend_from_slice(signature);
    tx.extend_from_slice(message);
    tx
}

/// Build and sign a native transfer from the slot's address.
pub fn sign_transfer(
    slot: &KeySlot,
    to: &Address,
    lamports: u64,
    blockhash: &Blockhash,
) -> LedgerResult<SignedTransaction> {
    let message = transfer_message(&slot.address(), to, lamports, blockhash);
    let signature = slot.sign(&message)?;
    Ok(SignedTransaction {
        bytes: assemble(&signature, &message),
        signature: Signature::new(signature),
    })
}

/// Sign a transaction built elsewhere, filling the fee payer's slot.
///
/// Accepts legacy and versioned messages. The fee payer must be the slot's
/// address; any other payload is refused rather than signed.
pub fn sign_prebuilt(bytes: &[u8], slot: &KeySlot) -> LedgerResult<SignedTransaction> {
    let (num_sigs, header_len) = decode_compact_u16(bytes)?;
    if num_sigs == 0 {
        return Err(LedgerError::Build("transaction requires no signatures".to_string()));
    }

    let sigs_start = header_len;
    let message_start = sigs_start + num_sigs as usize * 64;
    if message_start >= bytes.len() {
        return Err(LedgerError::Build(format!(
            "transaction too short for {} signatures",
            num_sigs
        )));
    }

    let message = &bytes[message_start..];
    let payer = fee_payer(message)?;
    if payer != slot.address() {
        return Err(LedgerError::Build(format!(
            "fee payer {} is not the session address",
            payer
        )));
    }

    let signature = slot.sign(message)?;
    let mut signed = bytes.to_vec();
    signed[sigs_start..sigs_start + 64].copy_from_slice(&signature);

    tracing::debug!(
        versioned = is_versioned(message),
        signatures = num_sigs,
        message_len = message.len(),
        "Prebuilt transaction signed"
    );

    Ok(SignedTransaction {
        bytes: signed,
        signature: Signature::new(signature),
    })
}

fn is_versioned(message: &[u8]) -> bool {
    message.first().map(|b| b & VERSION_PREFIX_MASK != 0).unwrap_or(false)
}

/// First account key of a legacy or versioned message.
pub fn fee_payer(message: &[u8]) -> LedgerResult<Address> {
    let mut offset = if is_versioned(message) { 1 } else { 0 };
    offset += 3;
    let rest = message
        .get(offset..)
        .ok_or_else(|| LedgerError::Build("message header truncated".to_string()))?;
    let (num_keys, len) = decode_compact_u16(rest)?;
    if num_keys == 0 {
        return Err(LedgerError::Build("message has no account keys".to_string()));
    }
    offset += len;
    let key: [u8; 32] = message
        .get(offset..offset + 32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| LedgerError::Build("account keys truncated".to_string()))?;
    Ok(Address::new(key))
}
