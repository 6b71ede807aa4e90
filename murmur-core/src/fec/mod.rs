//! Forward error correction for the DSSS framer.
//!
//! The framer consumes a declared-code contract: `decode(llrs, code_id)`
//! with the code named in the frame header. The small BCH code always
//! protects the header itself; payloads may select any supported code.

pub mod bch;
pub mod ldpc;

use serde::{Deserialize, Serialize};

use crate::errors::FecError;
use crate::utils::{bits_to_bytes, bytes_to_bits, hard_bit};
use ldpc::LdpcCode;

/// Construction seeds fixing the LDPC matrices for every build.
const LDPC_128_SEED: u64 = 0x6D75_726D;
const LDPC_256_SEED: u64 = 0x6D75_7232;

/// Identifier of a supported FEC code, as carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FecCodeId {
    /// BCH(15,11), single error corrected per codeword
    BchSmall,
    /// LDPC (128,64)
    Ldpc128,
    /// LDPC (256,128)
    Ldpc256,
}

impl FecCodeId {
    pub fn to_wire(self) -> u8 {
        match self {
            FecCodeId::BchSmall => 0,
            FecCodeId::Ldpc128 => 1,
            FecCodeId::Ldpc256 => 2,
        }
    }

    pub fn from_wire(id: u8) -> Result<Self, FecError> {
        match id {
            0 => Ok(FecCodeId::BchSmall),
            1 => Ok(FecCodeId::Ldpc128),
            2 => Ok(FecCodeId::Ldpc256),
            _ => Err(FecError::UnknownCode { id }),
        }
    }
}

/// All supported codes, constructed once and shared by encoder and decoder.
pub struct FecSuite {
    ldpc128: LdpcCode,
    ldpc256: LdpcCode,
}

impl FecSuite {
    pub fn new() -> Self {
        // seeded construction cannot fail for these shapes
        Self {
            ldpc128: LdpcCode::new(128, 64, LDPC_128_SEED).expect("fixed (128,64) code"),
            ldpc256: LdpcCode::new(256, 128, LDPC_256_SEED).expect("fixed (256,128) code"),
        }
    }

    fn data_block_bits(&self, code: FecCodeId) -> usize {
        match code {
            FecCodeId::BchSmall => bch::DATA_BITS,
            FecCodeId::Ldpc128 => self.ldpc128.message_bits(),
            FecCodeId::Ldpc256 => self.ldpc256.message_bits(),
        }
    }

    fn coded_block_bits(&self, code: FecCodeId) -> usize {
        match code {
            FecCodeId::BchSmall => bch::CODEWORD_BITS,
            FecCodeId::Ldpc128 => self.ldpc128.codeword_bits(),
            FecCodeId::Ldpc256 => self.ldpc256.codeword_bits(),
        }
    }

    /// Coded length in bits for a byte payload under `code`.
    pub fn coded_bits_for(&self, code: FecCodeId, byte_len: usize) -> usize {
        let data_bits = byte_len * 8;
        let block = self.data_block_bits(code);
        data_bits.div_ceil(block) * self.coded_block_bits(code)
    }

    /// Encode bytes into coded bits (0/1), zero-padding the final block.
    pub fn encode(&self, code: FecCodeId, bytes: &[u8]) -> Vec<u8> {
        let mut bits = bytes_to_bits(bytes);
        let block = self.data_block_bits(code);
        let padded = bits.len().div_ceil(block) * block;
        bits.resize(padded, 0);

        let mut coded = Vec::with_capacity(self.coded_bits_for(code, bytes.len()));
        for chunk in bits.chunks(block) {
            match code {
                FecCodeId::BchSmall => {
                    let mut data = [0u8; bch::DATA_BITS];
                    data.copy_from_slice(chunk);
                    coded.extend_from_slice(&bch::encode_block(&data));
                }
                FecCodeId::Ldpc128 => coded.extend(self.ldpc128.encode(chunk)),
                FecCodeId::Ldpc256 => coded.extend(self.ldpc256.encode(chunk)),
            }
        }
        coded
    }

    /// Decode coded LLRs back into `byte_len` bytes.
    pub fn decode(
        &self,
        code: FecCodeId,
        llrs: &[i8],
        byte_len: usize,
    ) -> Result<Vec<u8>, FecError> {
        let expected = self.coded_bits_for(code, byte_len);
        if llrs.len() != expected {
            return Err(FecError::LengthMismatch {
                expected,
                actual: llrs.len(),
            });
        }

        let coded_block = self.coded_block_bits(code);
        let mut data_bits = Vec::with_capacity(byte_len * 8 + self.data_block_bits(code));
        for chunk in llrs.chunks(coded_block) {
            match code {
                FecCodeId::BchSmall => {
                    let mut hard = [0u8; bch::CODEWORD_BITS];
                    for (slot, &llr) in hard.iter_mut().zip(chunk.iter()) {
                        *slot = hard_bit(llr);
                    }
                    let (data, _) = bch::decode_block(&hard);
                    data_bits.extend_from_slice(&data);
                }
                FecCodeId::Ldpc128 => data_bits.extend(self.ldpc128.decode(chunk)?),
                FecCodeId::Ldpc256 => data_bits.extend(self.ldpc256.decode(chunk)?),
            }
        }

        data_bits.truncate(byte_len * 8);
        Ok(bits_to_bytes(&data_bits))
    }
}

impl Default for FecSuite {
    fn default() -> Self {
        Self::new()
    }
}
