#[cfg(windows)]
fn main() {
    let mut res = winres::WindowsResource::new();
    if std::path::Path::new("icons/icon.ico").exists() {
        res.set_icon("icons/icon.ico");
    }
    res.set("ProductName", "BeamSync");
    res.set("FileDescription", "BeamSync - Sub-frame motion blur reduction");
    res.set("LegalCopyright", "© 2025 BeamSync Contributors");
    res.set("CompanyName", "BeamSync");
    res.set("OriginalFilename", "beamsync.exe");

    if let Err(e) = res.compile() {
        eprintln!("Failed to compile Windows resource: {}", e);
    }
}

#[cfg(not(windows))]
fn main() {
}
