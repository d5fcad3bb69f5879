pub mod file_name;
pub mod get_client_ip;
