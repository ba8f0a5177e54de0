//! Contract bindings via `sol!`.
//!
//! Only the functions the bring-up actually calls are included.

use alloy_core::{
    primitives::{Address, B256, b256},
    sol,
};

/// EIP-1967 admin slot, `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`.
pub const PROXY_ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// EIP-1967 implementation slot, `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`.
pub const PROXY_IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// The number of bytes stored in a single storage slot.
const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address.
const NUM_BYTES_ADDRESS: usize = 20;

/// Read an address stored right-aligned in a storage word.
pub fn slot_to_address(word: B256) -> Address {
    Address::from_slice(&word[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..])
}

/// Store an address right-aligned in a storage word.
pub fn address_to_slot(address: Address) -> B256 {
    address.into_word()
}

sol! {
    /// `Lib_AddressManager`, the name → address registry.
    interface AddressManager {
        function setAddress(string memory name, address addr) external;
        function getAddress(string memory name) external view returns (address addr);
        function owner() external view returns (address owner);
    }
}

sol! {
    interface Ownable {
        function owner() external view returns (address owner);
        function transferOwnership(address newOwner) external;
    }
}

sol! {
    /// Contracts resolving their collaborators through the address manager.
    interface AddressResolver {
        function initialize(address libAddressManager) external;
        function libAddressManager() external view returns (address manager);
    }
}

sol! {
    interface TransparentUpgradeableProxy {
        function changeAdmin(address newAdmin) external;
    }
}
