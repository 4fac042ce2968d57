pub mod bulk_loader;
