fn main() {
    fmconv::cli::run();
}
