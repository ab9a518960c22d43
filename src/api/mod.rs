pub mod reddit;
pub mod synthesia;
