//! Console text constants. These are wire-visible protocol text for tools
//! that script the shell, so they change only deliberately.

// Single source for the version literal so the banner and getinfo can
// never drift apart.
macro_rules! versioned_strings {
    ($version:literal) => {
        pub const NOS_VERSION: &str = $version;

        pub const WELCOME_TEXT: &str = concat!(
            "Nyan Keys Operating System (NOS) V",
            $version,
            "\r\n",
            "Made by Portland.HODL\r\n",
            "\r\n",
        );

        pub const GETINFO: &str = concat!(
            "Version: ",
            $version,
            "\r\n",
            "Author: Portland.HODL\r\n",
        );
    };
}

versioned_strings!("0.2");

pub const NEWLINE: &str = "\r\n";
pub const PATH_TEXT: &str = "NyanOS \u{1F431} > ";

pub const HELP: &str = "Nyan Keys Help Menu \u{1F431} \r\n\
\tgetinfo\r\n\
\tgetperf\r\n\
\tset-owner <name with spaces>\r\n\
\twrite-bitstream <size in bytes>\r\n\
\tbitcoin-miner-set <args | run with no args for help>\r\n\
\tdfumode\r\n";

pub const GETINFO_OWNER: &str = "Owner: ";

pub const GETPERF_LINE1: &str = "Nyan Keys Performance Stats\r\n";
pub const GETPERF_LINE2: &str = " ------------------------- \r\n";
pub const GETPERF_TIMES_SCANNED: &str = "Total Keyboard Scans 1s: ";

pub const SET_OWNER_SUCCESS: &str = "Nyan Keys owner has been successfully set\r\n";
pub const SET_OWNER_ERROR_LENGTH: &str = "Failed to set owner, name must fit in 64 bytes.\r\n";

pub const UNKNOWN_COMMAND: &str = "Command not supported by NyanOS";

pub const WRITE_BITSTREAM_START: &str = "ready\r\n";
pub const WRITE_BITSTREAM_EEPROM_WRITE_COMPLETED: &str = "Write to Nyan EEPROM completed.\r\n";
pub const WRITE_BITSTREAM_SUCCESS: &str = "Nyan Keys FPGA bitstream has been written\r\n";
pub const WRITE_BITSTREAM_ERROR_SIZE: &str =
    "Failed to parse bitstream length, size must be less than 65535 bytes.\r\n";
pub const WRITE_BITSTREAM_ERROR_ALLOC: &str =
    "Failed to allocate the bitstream capture buffer.\r\n";
pub const WRITE_BITSTREAM_ERROR_STORAGE: &str =
    "Failed to write bitstream to Nyan EEPROM.\r\n";

pub const BITCOIN_MINER_FAILED_ARG: &str = "Failed to parse arg1 please use\r\n\
\t - version\r\n\
\t - prv-block-header-hash\r\n\
\t - merkle-root-hash\r\n\
\t - timestamp\r\n\
\t - nbits\r\n\
\t - nonce\r\n\
\t - enable\r\n\
\t - disable\r\n";

pub const BITCOIN_MINER_VERSION_SUCCESS: &str =
    "Nyan BitCoin Miner block template version set successfully.\r\n";
pub const BITCOIN_MINER_PRV_BLOCK_HASH_SUCCESS: &str =
    "Nyan BitCoin Miner previous block hash set successfully.\r\n";
pub const BITCOIN_MINER_MERKLE_ROOT_HASH_SUCCESS: &str =
    "Nyan BitCoin Miner merkle root hash set successfully.\r\n";
pub const BITCOIN_MINER_TIMESTAMP_SUCCESS: &str =
    "Nyan BitCoin Miner timestamp set successfully.\r\n";
pub const BITCOIN_MINER_NBITS_SUCCESS: &str = "Nyan BitCoin Miner nbits set successfully.\r\n";
pub const BITCOIN_MINER_NONCE_SUCCESS: &str = "Nyan BitCoin Miner nonce set successfully.\r\n";
pub const BITCOIN_MINER_ENABLED: &str = "Nyan BitCoin Miner enabled.\r\n";
pub const BITCOIN_MINER_DISABLED: &str = "Nyan BitCoin Miner disabled.\r\n";

pub const ENTER_DFU_MODE_REBOOT_WARNING: &str = "Nyan Keys entering DFU mode and rebooting\r\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_composed_into_banner_and_getinfo() {
        let banner_version = alloc::format!("(NOS) V{}\r\n", NOS_VERSION);
        assert!(WELCOME_TEXT.contains(&banner_version));
        let info_version = alloc::format!("Version: {}\r\n", NOS_VERSION);
        assert!(GETINFO.contains(&info_version));
    }
}
