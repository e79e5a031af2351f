/// `keccak256("TopUp(address,address,uint256,uint256,uint256)")`, computed once
/// and matched against L1 log topics rather than resolved from an ABI at
/// runtime.
pub const TOPUP_EVENT_SIGNATURE: &str = "TopUp(address,address,uint256,uint256,uint256)";

/// L2 command opcodes packed into the high byte of `cmdBuf[0]`.
///
/// `CREATE_PLAYER` is the only command this engine submits via `cmdBuf`;
/// deposits go through the L2 application's dedicated `deposit` RPC
/// instead, so the configured `depositOpcode`/`withdrawOpcode` values
/// never reach a `cmdBuf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Installs the admin identity as a player. Always opcode `1`.
    CreatePlayer,
}

impl Opcode {
    /// The opcode value packed into a `cmdBuf` entry.
    pub const fn value(self) -> u64 {
        match self {
            Self::CreatePlayer => 1,
        }
    }
}

/// Packs a command header the way the L2 application RPC expects:
/// `cmdBuf[0] = (nonce << 16) | ((len + 1) << 8) | opcode`.
pub const fn pack_command_header(nonce: u64, params_len: u64, opcode: Opcode) -> u64 {
    (nonce << 16) | ((params_len + 1) << 8) | opcode.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_create_player_at_nonce_zero() {
        // cmdBuf[0] for CREATE_PLAYER with 0 params at nonce 0.
        assert_eq!(pack_command_header(0, 0, Opcode::CreatePlayer), 1 << 8 | 1);
    }

    #[test]
    fn packs_nonce_and_params_len_into_the_header() {
        let header = pack_command_header(7, 4, Opcode::CreatePlayer);
        assert_eq!(header, (7 << 16) | (5 << 8) | 1);
    }
}
