//! Collecting debug information from build trees.
//!
//! Linux binaries are split into a stripped copy and a `.debug` file,
//! macOS binaries get a `.dSYM` bundle, and Windows PDBs and DLLs are copied.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use goblin::mach::Mach;
use goblin::Object;
use regex::Regex;
use walkdir::WalkDir;

use crate::core::platform::Platform;
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

/// Compiler-generated PDBs for object files, never useful for symbolication.
static COMPILER_PDB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)vc\d+\.pdb$").unwrap());

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const MACHO_MAGICS: [[u8; 4]; 5] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
    [0xca, 0xfe, 0xba, 0xbe],
];

/// CodeView record pointing from a PE image to its PDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeView {
    /// PDB signature as 32 upper-case hex digits.
    pub guid: String,
    pub age: u32,
    /// File name of the PDB, without directories.
    pub pdb_name: String,
}

impl CodeView {
    /// Symbol-store directory name of the PDB.
    pub fn key(&self) -> String {
        format!("{}{:x}", self.guid, self.age)
    }
}

/// Identity of a PE image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeInfo {
    pub time_date_stamp: u32,
    pub size_of_image: u32,
    pub codeview: Option<CodeView>,
}

impl PeInfo {
    /// Symbol-store directory name of the image.
    pub fn key(&self) -> String {
        format!("{:08X}{:x}", self.time_date_stamp, self.size_of_image)
    }
}

/// What a file in a build tree is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryKind {
    Elf { has_debug_info: bool },
    MachO,
    Pe(PeInfo),
}

/// Format a PDB 7.0 signature like Microsoft tools do.
pub fn format_guid(signature: &[u8; 16]) -> String {
    let data1 = u32::from_le_bytes([signature[0], signature[1], signature[2], signature[3]]);
    let data2 = u16::from_le_bytes([signature[4], signature[5]]);
    let data3 = u16::from_le_bytes([signature[6], signature[7]]);
    let mut guid = format!("{:08X}{:04X}{:04X}", data1, data2, data3);
    for byte in &signature[8..] {
        guid.push_str(&format!("{:02X}", byte));
    }
    guid
}

pub fn is_compiler_pdb(file_name: &str) -> bool {
    COMPILER_PDB.is_match(file_name)
}

fn has_binary_magic(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    if file.read(&mut magic)? < 4 {
        return Ok(false);
    }
    Ok(magic == ELF_MAGIC || MACHO_MAGICS.contains(&magic) || magic[..2] == *b"MZ")
}

/// Classify a file; `None` for anything that is not an executable image.
pub fn classify(path: &Path) -> Result<Option<BinaryKind>> {
    if !has_binary_magic(path)? {
        return Ok(None);
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let object = match Object::parse(&bytes) {
        Ok(object) => object,
        Err(e) => {
            tracing::debug!("not parsing {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    let kind = match object {
        Object::Elf(elf) => {
            let has_debug_info = elf
                .section_headers
                .iter()
                .any(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(".debug_info"));
            Some(BinaryKind::Elf { has_debug_info })
        }
        Object::Mach(Mach::Binary(macho)) => {
            use goblin::mach::header::{MH_BUNDLE, MH_DYLIB, MH_EXECUTE};
            matches!(macho.header.filetype, MH_EXECUTE | MH_DYLIB | MH_BUNDLE)
                .then_some(BinaryKind::MachO)
        }
        Object::Mach(Mach::Fat(_)) => Some(BinaryKind::MachO),
        Object::PE(pe) => {
            let codeview = pe
                .debug_data
                .as_ref()
                .and_then(|d| d.codeview_pdb70_debug_info.as_ref())
                .map(|cv| {
                    let raw = String::from_utf8_lossy(cv.filename);
                    let full = raw.trim_end_matches('\0');
                    let pdb_name = full
                        .rsplit(['\\', '/'])
                        .next()
                        .unwrap_or(full)
                        .to_string();
                    CodeView {
                        guid: format_guid(&cv.signature),
                        age: cv.age,
                        pdb_name,
                    }
                });
            let size_of_image = pe
                .header
                .optional_header
                .map(|oh| oh.windows_fields.size_of_image)
                .unwrap_or_default();
            Some(BinaryKind::Pe(PeInfo {
                time_date_stamp: pe.header.coff_header.time_date_stamp,
                size_of_image,
                codeview,
            }))
        }
        _ => None,
    };
    Ok(kind)
}

fn regular_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

fn copy_relative(build_dir: &Path, file: &Path, dest: &Path) -> Result<PathBuf> {
    let relative = file.strip_prefix(build_dir).unwrap_or(file);
    let target = dest.join(relative);
    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(file, &target).with_context(|| {
        format!("failed to copy {} to {}", file.display(), target.display())
    })?;
    Ok(target)
}

/// Harvest debug information from `build_dir` into `dest`.
///
/// Returns the number of binaries collected.
pub fn harvest(platform: &Platform, build_dir: &Path, dest: &Path) -> Result<usize> {
    match platform {
        Platform::Linux => harvest_elf(build_dir, dest),
        Platform::Darwin => harvest_macho(build_dir, dest),
        Platform::Win32 => harvest_windows(build_dir, dest),
        Platform::Other(name) => {
            tracing::warn!("no debug symbol harvesting on `{}`", name);
            Ok(0)
        }
    }
}

fn harvest_elf(build_dir: &Path, dest: &Path) -> Result<usize> {
    let mut count = 0;
    for file in regular_files(build_dir) {
        if !matches!(classify(&file)?, Some(BinaryKind::Elf { has_debug_info: true })) {
            continue;
        }
        let copy = copy_relative(build_dir, &file, dest)?;
        split_debug_info(&copy)?;
        count += 1;
    }
    Ok(count)
}

/// Move DWARF data of an ELF file into `<file>.debug` and link it back.
pub fn split_debug_info(file: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("binary path has no file name")?;
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let debug_name = format!("{}.debug", name);

    ProcessBuilder::new("objcopy")
        .args(["--only-keep-debug", &name, &debug_name])
        .cwd(dir)
        .exec_and_check()?;
    ProcessBuilder::new("objcopy")
        .arg("--strip-debug")
        .arg(format!("--add-gnu-debuglink={}", debug_name))
        .arg(&name)
        .cwd(dir)
        .exec_and_check()?;

    Ok(dir.join(debug_name))
}

fn harvest_macho(build_dir: &Path, dest: &Path) -> Result<usize> {
    let mut count = 0;
    for file in regular_files(build_dir) {
        if file.extension().is_some_and(|ext| ext == "a" || ext == "o") {
            continue;
        }
        if !matches!(classify(&file)?, Some(BinaryKind::MachO)) {
            continue;
        }
        let copy = copy_relative(build_dir, &file, dest)?;
        let dsym = PathBuf::from(format!("{}.dSYM", copy.display()));
        ProcessBuilder::new("dsymutil")
            .arg(&copy)
            .arg("-o")
            .arg(&dsym)
            .exec_and_check()?;
        count += 1;
    }
    Ok(count)
}

fn harvest_windows(build_dir: &Path, dest: &Path) -> Result<usize> {
    let mut count = 0;
    for file in regular_files(build_dir) {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let wanted = (name.ends_with(".pdb") && !is_compiler_pdb(&name)) || name.ends_with(".dll");
        if wanted {
            copy_relative(build_dir, &file, dest)?;
            count += 1;
        }
    }
    Ok(count)
}

/// PE images under `dir` with their identity, for symbol stores.
pub fn pe_images(dir: &Path) -> Result<Vec<(PathBuf, PeInfo)>> {
    let mut images = Vec::new();
    for file in regular_files(dir) {
        let is_image = file
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| e == "dll" || e == "exe");
        if !is_image {
            continue;
        }
        if let Some(BinaryKind::Pe(info)) = classify(&file)? {
            images.push((file, info));
        }
    }
    Ok(images)
}

/// Find a PDB by file name under `dir`, ignoring case.
pub fn find_pdb(dir: &Path, pdb_name: &str) -> Option<PathBuf> {
    let wanted = pdb_name.to_lowercase();
    regular_files(dir).find(|f| {
        f.file_name()
            .is_some_and(|n| n.to_string_lossy().to_lowercase() == wanted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compiler_pdb() {
        assert!(is_compiler_pdb("vc140.pdb"));
        assert!(is_compiler_pdb("VC143.PDB"));
        assert!(!is_compiler_pdb("zlib.pdb"));
        assert!(!is_compiler_pdb("vc.pdb"));
    }

    #[test]
    fn test_format_guid_and_keys() {
        let signature = [
            0x78, 0x56, 0x34, 0x12, 0xbc, 0x9a, 0xf0, 0xde, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef,
        ];
        let guid = format_guid(&signature);
        assert_eq!(guid, "123456789ABCDEF00123456789ABCDEF");

        let cv = CodeView {
            guid,
            age: 26,
            pdb_name: "zlib.pdb".into(),
        };
        assert_eq!(cv.key(), "123456789ABCDEF00123456789ABCDEF1a");

        let pe = PeInfo {
            time_date_stamp: 0x5e1f_00ab,
            size_of_image: 0x1c000,
            codeview: None,
        };
        assert_eq!(pe.key(), "5E1F00AB1c000");
    }

    #[test]
    fn test_text_files_are_not_binaries() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("CMakeCache.txt");
        fs::write(&file, "CMAKE_BUILD_TYPE:STRING=Release\n").unwrap();
        assert_eq!(classify(&file).unwrap(), None);

        let short = tmp.path().join("x");
        fs::write(&short, "MZ").unwrap();
        assert_eq!(classify(&short).unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_classify_own_executable() {
        let exe = std::env::current_exe().unwrap();
        assert!(matches!(
            classify(&exe).unwrap(),
            Some(BinaryKind::Elf { .. })
        ));
    }

    #[test]
    fn test_harvest_windows_copies_pdbs_and_dlls() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let dest = tmp.path().join("dest");
        fs::create_dir_all(build.join("Release")).unwrap();
        fs::write(build.join("Release/zlib.dll"), "dll").unwrap();
        fs::write(build.join("Release/zlib.pdb"), "pdb").unwrap();
        fs::write(build.join("vc143.pdb"), "pdb").unwrap();
        fs::write(build.join("zlib.lib"), "lib").unwrap();

        let count = harvest(&Platform::Win32, &build, &dest).unwrap();
        assert_eq!(count, 2);
        assert!(dest.join("Release/zlib.dll").is_file());
        assert!(dest.join("Release/zlib.pdb").is_file());
        assert!(!dest.join("vc143.pdb").exists());
    }

    #[test]
    fn test_find_pdb_ignores_case() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::write(tmp.path().join("a/b/ZLib.pdb"), "").unwrap();
        assert_eq!(
            find_pdb(tmp.path(), "zlib.pdb"),
            Some(tmp.path().join("a/b/ZLib.pdb"))
        );
        assert_eq!(find_pdb(tmp.path(), "other.pdb"), None);
    }
}
