//! Filesystem, process and terminal helpers

use log::{debug, error, info};
use openssl::rand::rand_bytes;
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use crate::common::{Result, UtilError};

/// Lines kept for the failure message of a realtime script
const REALTIME_TAIL: usize = 10;

/// How [`run_script`] runs a command
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptOptions {
    /// Collect output and return non-zero exit codes instead of failing
    pub capture: bool,
    /// Echo output lines as they arrive; stderr is merged into stdout
    pub realtime: bool,
    /// Print the command instead of running it
    pub dry: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` with `/bin/bash -c`
///
/// # Errors
///
/// [`UtilError::ScriptFailed`] on a non-zero exit unless `capture` is set.
pub fn run_script(command: &str, opts: &ScriptOptions) -> Result<ScriptOutput> {
    debug!("Running subprocess: [{}] (capture: {})", command, opts.capture);
    if opts.dry {
        println!("{}", command);
        return Ok(ScriptOutput::default());
    }

    let (code, stdout, stderr, failure) = if opts.realtime {
        run_realtime(command, opts.capture)?
    } else {
        let output = Command::new("/bin/bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if opts.capture {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let code = output.status.code().unwrap_or(-1);
        (code, stdout, stderr.clone(), stderr)
    };

    if code != 0 {
        error!("Subprocess failed ({}): {}", code, failure);
        if !opts.capture {
            return Err(UtilError::ScriptFailed {
                code,
                output: failure,
            });
        }
    }
    Ok(ScriptOutput {
        code,
        stdout,
        stderr,
    })
}

fn run_realtime(command: &str, capture: bool) -> Result<(i32, String, String, String)> {
    let mut child = Command::new("/bin/bash")
        .arg("-c")
        .arg(format!("exec 2>&1\n{}", command))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()?;
    let pid = child.id();

    let mut captured = String::new();
    let mut tail: Vec<String> = Vec::with_capacity(REALTIME_TAIL);
    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            let line = line.trim_end();
            debug!("[{}:stdout] {}", pid, line);
            println!("{}", line);
            if tail.len() == REALTIME_TAIL {
                tail.remove(0);
            }
            tail.push(line.to_string());
            if capture {
                captured.push_str(line);
                captured.push('\n');
            }
        }
    }

    let code = child.wait()?.code().unwrap_or(-1);
    Ok((
        code,
        captured.trim_end().to_string(),
        String::new(),
        tail.join("\n"),
    ))
}

/// The system temp directory, or a fresh directory inside it
pub fn temp_dir(mkdtemp: bool) -> Result<PathBuf> {
    let base = env::temp_dir();
    let dir = if mkdtemp {
        base.join(format!("tmp{}", random_string(8)?))
    } else {
        base
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path of `name` under [`temp_dir`], optionally created empty
pub fn temp_file(name: &str, mkdtemp: bool, touch: bool) -> Result<PathBuf> {
    let path = temp_dir(mkdtemp)?.join(name);
    if touch {
        touch_file(&path)?;
    }
    Ok(path)
}

/// Absolute path under the working directory; its parent is created
pub fn from_cwd<P: AsRef<Path>>(parts: &[P]) -> Result<PathBuf> {
    let mut path = env::current_dir()?;
    path.extend(parts.iter().map(AsRef::as_ref));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(path)
}

/// Path under the home directory
///
/// When `home_envvar` names a set variable, its value replaces the home
/// directory and must exist. With `create`, either the whole path is created
/// as directories (`all_dir`) or the parent is created and the file touched.
pub fn under_home<P: AsRef<Path>>(
    parts: &[P],
    all_dir: bool,
    create: bool,
    home_envvar: Option<&str>,
) -> Result<PathBuf> {
    let override_home = home_envvar.and_then(|name| env::var_os(name).map(|v| (name, v)));
    let home = match override_home {
        Some((name, value)) => {
            let dir = PathBuf::from(value);
            if !dir.is_dir() {
                return Err(UtilError::InvalidInput(format!(
                    "{} points to a missing directory: {}",
                    name,
                    dir.display()
                )));
            }
            dir
        }
        None => dirs::home_dir()
            .ok_or_else(|| UtilError::Other("Cannot determine home directory".to_string()))?,
    };

    let mut path = home;
    path.extend(parts.iter().map(AsRef::as_ref));
    let path = PathBuf::from(normalize_path(&path.to_string_lossy()));

    if create {
        if all_dir {
            fs::create_dir_all(&path)?;
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            touch_file(&path)?;
        }
    }
    Ok(path)
}

/// Expand `~` and resolve an existing path; `None` for empty or missing paths
pub fn from_path_str(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        return None;
    }
    match fs::canonicalize(expand_home(path)) {
        Ok(resolved) => Some(resolved),
        Err(_) => {
            error!("Path does not exist: {}", path);
            None
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

/// Lexically normalize `path`, expanding a leading `~`
///
/// ```
/// # use utilkit::os::normalize_path;
/// assert_eq!(normalize_path("/a/b/../c/./d"), "/a/c/d");
/// assert_eq!(normalize_path("a//b/"), "a/b");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in Path::new(path).components() {
        match component {
            Component::RootDir => absolute = true,
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().into_owned())
            }
            Component::CurDir => {}
            Component::ParentDir => match parts.last().map(String::as_str) {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let joined = parts.join("/");
    let normalized = match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    };
    if normalized.starts_with('~') {
        expand_home(&normalized).to_string_lossy().into_owned()
    } else {
        normalized
    }
}

/// Split the extension off the file name, keeping leading dots in the stem
fn split_ext(filename: &str) -> (&str, &str) {
    let name_start = filename.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &filename[name_start..];
    let stem_start = name.len() - name.trim_start_matches('.').len();
    match name[stem_start..].rfind('.') {
        Some(dot) => filename.split_at(name_start + stem_start + dot),
        None => (filename, ""),
    }
}

/// `report.txt` + `_v2` → `report_v2.txt`
pub fn add_suffix(filename: &str, suffix: &str) -> String {
    let (stem, ext) = split_ext(filename);
    format!("{}{}{}", stem, suffix, ext)
}

/// Replace the extension; `extension` may start with a dot
pub fn modify_extension(filename: &str, extension: &str) -> String {
    let (stem, _) = split_ext(filename);
    if extension.starts_with('.') {
        format!("{}{}", stem, extension)
    } else {
        format!("{}.{}", stem, extension)
    }
}

/// Random lowercase hex string of `len` characters
pub fn random_string(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    rand_bytes(&mut bytes)?;
    let mut hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(len);
    Ok(hex)
}

/// Whether the login name is `root`
pub fn is_root() -> bool {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
        .map(|user| user == "root")
        .unwrap_or(false)
}

/// Working directory switch, undone on drop
#[derive(Debug)]
pub struct SwitchDir {
    original: PathBuf,
    current: PathBuf,
}

impl SwitchDir {
    pub fn path(&self) -> &Path {
        &self.current
    }
}

impl Drop for SwitchDir {
    fn drop(&mut self) {
        info!("Switching CWD BACK to [{}]", self.original.display());
        if let Err(e) = env::set_current_dir(&self.original) {
            error!("Cannot switch back to {}: {}", self.original.display(), e);
        }
    }
}

/// Change into `dir` (a fresh temp directory when `None`), creating it
pub fn switch_dir(dir: Option<&Path>) -> Result<SwitchDir> {
    let target = match dir {
        Some(dir) => dir.to_path_buf(),
        None => temp_dir(true)?,
    };
    let original = env::current_dir()?;
    fs::create_dir_all(&target)?;

    info!("Switching CWD to [{}]", target.display());
    env::set_current_dir(&target)?;
    Ok(SwitchDir {
        original,
        current: target,
    })
}

/// Load `KEY=value` lines into the environment
///
/// Reads `.env` in the working directory when `filename` is `None`. Existing
/// variables are replaced only with `override_existing`. With `interpolate`,
/// `${NAME}` in unquoted or double quoted values is substituted. Returns
/// whether a file was loaded.
pub fn load_dotenv(filename: Option<&Path>, override_existing: bool, interpolate: bool) -> Result<bool> {
    let path = match filename {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?.join(".env"),
    };
    if !path.is_file() {
        debug!("No dotenv file at {}", path.display());
        return Ok(false);
    }

    let content = fs::read_to_string(&path)?;
    let mut loaded: HashMap<String, String> = HashMap::new();
    for line in content.lines() {
        let Some((key, raw)) = parse_dotenv_line(line) else {
            continue;
        };

        let (value, expand) = unquote(raw);
        let value = if interpolate && expand {
            expand_vars(&value, &loaded, override_existing)
        } else {
            value
        };

        if override_existing || env::var_os(key).is_none() {
            env::set_var(key, &value);
        }
        loaded.insert(key.to_string(), value);
    }

    debug!("Loaded {} variables from {}", loaded.len(), path.display());
    Ok(true)
}

fn parse_dotenv_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Strip quotes; single quoted values are taken literally
fn unquote(raw: &str) -> (String, bool) {
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return (raw[1..raw.len() - 1].to_string(), false);
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return (raw[1..raw.len() - 1].replace("\\n", "\n"), true);
    }
    // Inline comment after an unquoted value
    let value = match raw.find(" #") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    (value.trim_end().to_string(), true)
}

fn expand_vars(value: &str, loaded: &HashMap<String, String>, file_first: bool) -> String {
    let lookup = |name: &str| {
        let from_file = loaded.get(name).cloned();
        let from_env = env::var(name).ok();
        if file_first {
            from_file.or(from_env)
        } else {
            from_env.or(from_file)
        }
        .unwrap_or_default()
    };

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                out.push_str(&lookup(&rest[start + 2..start + 2 + end]));
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn touch_file(path: &Path) -> io::Result<()> {
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Log, print `msg` to stderr and exit with `rc`
pub fn bye(msg: &str, rc: i32) -> ! {
    error!("Exit with return code: {}: {}", rc, msg);
    eprintln!("{}", msg);
    std::process::exit(rc)
}

/// Exit normally, printing `msg` when given
pub fn goodbye(msg: Option<&str>) -> ! {
    match msg {
        Some(msg) => {
            info!("Exit normally: {}", msg);
            println!("{}", msg);
        }
        None => info!("Exit normally"),
    }
    std::process::exit(0)
}

/// Wait for Enter unless `skip`
pub fn pause(msg: Option<&str>, skip: bool) -> Result<()> {
    if skip {
        return Ok(());
    }
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    read_answer(&mut input, &mut output, msg.unwrap_or("Press Enter to continue..."))?;
    Ok(())
}

/// Ask `Do you want to continue?`; with `abort`, a refusal is an error
pub fn confirm(abort: bool) -> Result<bool> {
    let stdin = io::stdin();
    confirm_from(&mut stdin.lock(), &mut io::stdout(), abort)
}

fn confirm_from<R: BufRead, W: Write>(input: &mut R, output: &mut W, abort: bool) -> Result<bool> {
    let answer = read_answer(input, output, "Do you want to continue? [y/N]: ")?;
    let accepted = matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes");
    if !accepted && abort {
        return Err(UtilError::Other("Aborted!".to_string()));
    }
    Ok(accepted)
}

/// Ask for a value until it parses as `T`; an empty answer takes `default`
pub fn prompt<T>(msg: &str, default: Option<T>) -> Result<T>
where
    T: FromStr + Display,
{
    let stdin = io::stdin();
    prompt_from(&mut stdin.lock(), &mut io::stdout(), msg, default)
}

fn prompt_from<R, W, T>(input: &mut R, output: &mut W, msg: &str, default: Option<T>) -> Result<T>
where
    R: BufRead,
    W: Write,
    T: FromStr + Display,
{
    let question = match &default {
        Some(default) => format!("{} [{}]: ", msg, default),
        None => format!("{}: ", msg),
    };
    let mut default = default;
    loop {
        let answer = read_answer(input, output, &question)?;
        if answer.is_empty() {
            if let Some(default) = default.take() {
                return Ok(default);
            }
            continue;
        }
        match answer.parse::<T>() {
            Ok(value) => return Ok(value),
            Err(_) => writeln!(output, "Error: '{}' is not a valid value.", answer)?,
        }
    }
}

fn read_answer<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(UtilError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed",
        )));
    }
    Ok(line.trim().to_string())
}
