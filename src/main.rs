fn main() {
    upp::cli::run();
}
