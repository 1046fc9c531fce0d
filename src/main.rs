fn main() {
    dbbench::cmdline();
}
