//! Fixed facts about the fictional network that rules and detectors share.

use crate::core::session::HostAddress;

/// The attacking host named in the briefing.
pub const MAIN_HOST: HostAddress = HostAddress::new(174, 156, 12, 4);

/// Key used by the toy cipher on stored passwords.
pub const HASHING_KEY: &str = "tul";

pub const STUDENT_ACCOUNT: &str = "student";
pub const ROUTER_ACCOUNT: &str = "router";
pub const LAB_TECH_ACCOUNT: &str = "lab_tech";

/// The lab PC whose files hold the first clues.
pub const PC_1: &str = "10.0.0.11";
/// The PC spreading the botnet.
pub const INFECTED_PC: &str = "10.0.0.66";

/// `Firewall.status` of a level that is switched off.
pub const FIREWALL_INACTIVE: &str = "inactive";

pub const BOTNET_CONTENT_ID: i64 = 66;
pub const BOTNET_DIRECTORY_ID: i64 = 606;

pub struct PrivilegedHost {
    pub host: HostAddress,
    pub level: u8,
    pub label: &'static str,
}

pub static PRIVILEGED_HOSTS: &[PrivilegedHost] = &[PrivilegedHost {
    host: HostAddress::new(174, 156, 12, 1),
    level: 2,
    label: "botnet control node",
}];

/// Accounts whose stored password is ciphered with [`HASHING_KEY`].
pub struct CipheredAccount {
    pub name: &'static str,
    pub plaintext: &'static str,
    pub permission: u8,
}

pub static CIPHERED_ACCOUNTS: &[CipheredAccount] = &[
    CipheredAccount {
        name: LAB_TECH_ACCOUNT,
        plaintext: "quantum7",
        permission: 1,
    },
    CipheredAccount {
        name: ROUTER_ACCOUNT,
        plaintext: "gatekeeper9",
        permission: 2,
    },
    CipheredAccount {
        name: "itexpert",
        plaintext: "coffee4ever",
        permission: 2,
    },
    CipheredAccount {
        name: "rector",
        plaintext: "almamater1",
        permission: 3,
    },
];

pub fn ciphered_account(name: &str) -> Option<&'static CipheredAccount> {
    CIPHERED_ACCOUNTS.iter().find(|a| a.name == name)
}
