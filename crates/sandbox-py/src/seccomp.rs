//! Assembles the classic-BPF seccomp program for the sandboxed process.
//!
//! The program is deny-by-default: it checks the architecture, loads the
//! syscall number, returns `ALLOW` for numbers on the policy's allow-list,
//! and kills the process for everything else. The serialized bytes are
//! embedded base64 into the generated script's preamble, which installs
//! them via `prctl(PR_SET_SECCOMP, SECCOMP_MODE_FILTER)` before any user
//! line executes. Nothing reachable from user code can replace the filter —
//! seccomp filters only stack, they never relax.

const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;

// BPF opcodes (linux/bpf_common.h)
const BPF_LD: u16 = 0x00;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JMP: u16 = 0x05;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;
const BPF_RET: u16 = 0x06;

// Field offsets in struct seccomp_data.
const OFF_NR: u32 = 0;
const OFF_ARCH: u32 = 4;

/// One `struct sock_filter`, serialized little-endian as 8 bytes.
#[derive(Debug, Clone, Copy)]
struct Insn {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

const fn stmt(code: u16, k: u32) -> Insn {
    Insn {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Insn {
    Insn { code, jt, jf, k }
}

/// Build the serialized filter for the given syscall allow-list.
pub fn filter_program(allowlist: &[i64]) -> Vec<u8> {
    let mut program = vec![
        // Kill anything not running the expected ABI.
        stmt(BPF_LD | BPF_W | BPF_ABS, OFF_ARCH),
        jump(BPF_JMP | BPF_JEQ | BPF_K, AUDIT_ARCH_X86_64, 1, 0),
        stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),
        stmt(BPF_LD | BPF_W | BPF_ABS, OFF_NR),
    ];

    for &nr in allowlist {
        // jt=0 falls through to the ALLOW return; jf=1 skips it.
        program.push(jump(BPF_JMP | BPF_JEQ | BPF_K, nr as u32, 0, 1));
        program.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    }

    program.push(stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    let mut bytes = Vec::with_capacity(program.len() * 8);
    for insn in &program {
        bytes.extend_from_slice(&insn.code.to_le_bytes());
        bytes.push(insn.jt);
        bytes.push(insn.jf);
        bytes.extend_from_slice(&insn.k.to_le_bytes());
    }
    bytes
}
