//! A restricted x86 instruction encoder covering the mnemonic vocabulary the
//! patching DSL is allowed to emit inline.
//!
//! Encoding failure is silent: an empty result means "try the next
//! interpretation" (string literal, then raw hex) — this module never
//! raises.

fn register_index(name: &str) -> Option<u8> {
    match name {
        "eax" => Some(0),
        "ecx" => Some(1),
        "edx" => Some(2),
        "ebx" => Some(3),
        "esp" => Some(4),
        "ebp" => Some(5),
        "esi" => Some(6),
        "edi" => Some(7),
        _ => None,
    }
}

fn alu_opcode(mnemonic: &str) -> Option<u8> {
    match mnemonic {
        "add" => Some(0x01),
        "or" => Some(0x09),
        "and" => Some(0x21),
        "sub" => Some(0x29),
        "xor" => Some(0x31),
        "cmp" => Some(0x39),
        _ => None,
    }
}

/// Parse a decimal or `0x`-prefixed hex integer literal, negative sign
/// permitted on either form.
fn parse_imm(token: &str) -> Option<i64> {
    let (neg, token) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = if let Some(hex) = token.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        token.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value })
}

/// Tokenize a line: lowercase, split on spaces and commas, drop empties.
fn tokenize(line: &str) -> Vec<String> {
    line.to_lowercase()
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Translate one line of mnemonic text into machine bytes at `current`, the
/// address the first emitted byte will occupy.
///
/// Returns `None` when the line doesn't match any supported rule or a
/// relative displacement can't be computed — never an error.
pub fn encode(line: &str, current: u64) -> Option<Vec<u8>> {
    let tokens = tokenize(line);
    match tokens.first().map(String::as_str) {
        Some("nop") if tokens.len() == 1 => Some(vec![0x90]),
        Some("ret") if tokens.len() == 1 => Some(vec![0xC3]),
        Some("jmp") if tokens.len() == 2 => {
            let target: i64 = parse_imm(&tokens[1])?;
            let next_ip = current.checked_add(5)?;
            let rel = target.checked_sub(next_ip as i64)?;
            let rel32 = i32::try_from(rel).ok()?;
            let mut out = vec![0xE9];
            out.extend_from_slice(&rel32.to_le_bytes());
            Some(out)
        }
        Some("mov") if tokens.len() == 3 => {
            let reg = register_index(&tokens[1])?;
            let imm: i64 = parse_imm(&tokens[2])?;
            let imm32 = i32::try_from(imm).ok()?;
            let mut out = vec![0xB8 + reg];
            out.extend_from_slice(&imm32.to_le_bytes());
            Some(out)
        }
        Some(mnemonic) if tokens.len() == 3 && alu_opcode(mnemonic).is_some() => {
            let opcode = alu_opcode(mnemonic)?;
            let dst = register_index(&tokens[1])?;
            let src = register_index(&tokens[2])?;
            let modrm = 0xC0 | (src << 3) | dst;
            Some(vec![opcode, modrm])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_and_ret_are_single_bytes() {
        assert_eq!(encode("nop", 0), Some(vec![0x90]));
        assert_eq!(encode("ret", 0), Some(vec![0xC3]));
    }

    #[test]
    fn jmp_computes_pc_relative_displacement() {
        let bytes = encode("jmp 0x00402000", 0x00401000).unwrap();
        assert_eq!(bytes, vec![0xE9, 0xFB, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn jmp_accepts_decimal_target_too() {
        let bytes = encode(&format!("jmp {}", 0x00402000i64), 0x00401000).unwrap();
        assert_eq!(bytes, vec![0xE9, 0xFB, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn jmp_roundtrip_property() {
        let current: u64 = 0x1000;
        for target in [0i64, 0x2000, -0x500, 0x7FFF_FFFF] {
            if let Some(bytes) = encode(&format!("jmp {}", target), current) {
                let rel = i32::from_le_bytes(bytes[1..5].try_into().unwrap());
                let recovered = (current as i64 + 5) + rel as i64;
                assert_eq!(recovered, target);
            }
        }
    }

    #[test]
    fn mov_encodes_register_and_immediate() {
        assert_eq!(
            encode("mov eax, 0x11223344", 0),
            Some(vec![0xB8, 0x44, 0x33, 0x22, 0x11])
        );
        assert_eq!(
            encode("mov ecx, 1", 0),
            Some(vec![0xB9, 0x01, 0x00, 0x00, 0x00])
        );
    }

    #[test]
    fn alu_ops_encode_modrm_with_src_and_dst() {
        // add eax, ebx -> 01 C3  (opcode=01, modrm = C0 | (ebx=3 << 3) | eax=0)
        assert_eq!(encode("add eax, ebx", 0), Some(vec![0x01, 0xC3]));
        assert_eq!(encode("xor esi, edi", 0), Some(vec![0x31, 0xC0 | (7 << 3) | 6]));
        assert_eq!(encode("cmp edx, ecx", 0), Some(vec![0x39, 0xC0 | (1 << 3) | 2]));
    }

    #[test]
    fn unknown_mnemonic_is_no_encoding() {
        assert_eq!(encode("push eax", 0), None);
        assert_eq!(encode("", 0), None);
    }

    #[test]
    fn tokenize_collapses_commas_and_case() {
        assert_eq!(tokenize("MOV EAX,  0x10"), vec!["mov", "eax", "0x10"]);
    }
}
