fn main() {
    cloud_augment::cli::run();
}
