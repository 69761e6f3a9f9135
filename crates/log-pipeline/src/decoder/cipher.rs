//! 디바이스 로그 컨테이너 스트림 암호
//!
//! ChaCha20 블록 함수와 동일한 구조(16워드 상태, 10회 double-round)를
//! 고정 키와 nonce로 사용합니다. 기밀성이 아닌 난독화 용도이며 I/O가 없는 순수 함수입니다.
//!
//! 컨테이너 복호화는 8192바이트 청크 단위로 진행되고, 각 청크는
//! 블록 카운터를 `chunk_offset / 64`로 다시 설정한 새 스트림으로 처리합니다.

/// 컨테이너에 내장된 256비트 키
pub const CONTAINER_KEY: [u8; 32] = *b"plaud2023_log_chacha20_key_32bit";

/// 컨테이너에 내장된 96비트 nonce
pub const CONTAINER_NONCE: [u8; 12] = [0x01; 12];

/// 컨테이너 복호화 청크 크기
pub const CHUNK_SIZE: usize = 8192;

/// 키스트림 블록 크기
pub const BLOCK_SIZE: usize = 64;

/// "expand 32-byte k"
const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

const DOUBLE_ROUNDS: usize = 10;

#[inline(always)]
fn quarter_round(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    s[a] = s[a].wrapping_add(s[b]);
    s[d] = (s[d] ^ s[a]).rotate_left(16);
    s[c] = s[c].wrapping_add(s[d]);
    s[b] = (s[b] ^ s[c]).rotate_left(12);
    s[a] = s[a].wrapping_add(s[b]);
    s[d] = (s[d] ^ s[a]).rotate_left(8);
    s[c] = s[c].wrapping_add(s[d]);
    s[b] = (s[b] ^ s[c]).rotate_left(7);
}

fn le_word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// 주어진 블록 카운터에 대한 64바이트 키스트림 블록을 생성합니다.
pub fn keystream_block(key: &[u8; 32], nonce: &[u8; 12], block_counter: u32) -> [u8; BLOCK_SIZE] {
    let mut initial = [0u32; 16];
    initial[..4].copy_from_slice(&SIGMA);
    for (i, word) in key.chunks_exact(4).enumerate() {
        initial[4 + i] = le_word(word);
    }
    initial[12] = block_counter;
    for (i, word) in nonce.chunks_exact(4).enumerate() {
        initial[13 + i] = le_word(word);
    }

    let mut working = initial;
    for _ in 0..DOUBLE_ROUNDS {
        // column rounds
        quarter_round(&mut working, 0, 4, 8, 12);
        quarter_round(&mut working, 1, 5, 9, 13);
        quarter_round(&mut working, 2, 6, 10, 14);
        quarter_round(&mut working, 3, 7, 11, 15);
        // diagonal rounds
        quarter_round(&mut working, 0, 5, 10, 15);
        quarter_round(&mut working, 1, 6, 11, 12);
        quarter_round(&mut working, 2, 7, 8, 13);
        quarter_round(&mut working, 3, 4, 9, 14);
    }

    let mut out = [0u8; BLOCK_SIZE];
    for (i, (w, s)) in working.iter().zip(initial.iter()).enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&w.wrapping_add(*s).to_le_bytes());
    }
    out
}

/// `start_counter`부터 연속된 키스트림 블록과 XOR합니다.
///
/// 대칭 연산이므로 암호화와 복호화 모두에 사용됩니다.
pub fn apply(data: &[u8], key: &[u8; 32], nonce: &[u8; 12], start_counter: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for (i, block) in data.chunks(BLOCK_SIZE).enumerate() {
        let ks = keystream_block(key, nonce, start_counter.wrapping_add(i as u32));
        out.extend(block.iter().zip(ks.iter()).map(|(b, k)| b ^ k));
    }
    out
}

/// 컨테이너 바이트 전체를 복호화합니다.
///
/// 8192바이트 청크마다 카운터를 `offset / 64`로 재설정합니다.
pub fn decrypt_container(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for (idx, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
        let offset = idx * CHUNK_SIZE;
        let counter = (offset / BLOCK_SIZE) as u32;
        out.extend(apply(chunk, &CONTAINER_KEY, &CONTAINER_NONCE, counter));
    }
    out
}

/// 평문 아카이브를 컨테이너 형식으로 암호화합니다.
pub fn encrypt_container(data: &[u8]) -> Vec<u8> {
    decrypt_container(data)
}
