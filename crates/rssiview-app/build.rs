fn main() {
    slint_build::compile("src/ui.slint").unwrap();
}
