pub mod checksum;
pub mod rollback;
pub mod run;
