// Error codes shared by every crate of the authentication chain

pub mod authentication {
    pub const INVALID_CREDENTIALS: &str = "AUTH_2001";
    pub const ACCOUNT_DISABLED: &str = "AUTH_2002";
    pub const USER_CREATION_NOT_ALLOWED: &str = "AUTH_2003";
}

pub mod configuration {
    pub const DUPLICATE_PLUGIN: &str = "CONFIG_5001";
    pub const INVALID_CHANNEL: &str = "CONFIG_5002";
    pub const MALFORMED_IDENTITY: &str = "CONFIG_5003";
    pub const INVALID_SETTING: &str = "CONFIG_5004";
}

pub mod source {
    pub const SOURCE_UNAVAILABLE: &str = "SOURCE_6001";
    pub const SOURCE_TIMEOUT: &str = "SOURCE_6002";
}

pub mod storage {
    pub const SETTINGS_STORE: &str = "STORE_7001";
    pub const USER_STORE: &str = "STORE_7002";
}
