use crate::request::IntegrationRequest;
use anyhow::{bail, Context, Error};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Driver run by the Python interpreter. Arguments:
/// `species1 data1 species2 data2 maps staging save_processed`
const SAMAP_DRIVER: &str = include_str!("samap_driver.py");

pub const DEFAULT_PYTHON: &str = "python3";

/// Something that can integrate the datasets of a request and write the result to `staging`.
pub trait Integrator {
    fn integrate(&self, request: &IntegrationRequest, staging: &Path) -> Result<(), Error>;
}

/// Runs SAMap in a Python interpreter that has the `samap` package installed.
#[derive(Clone, Debug)]
pub struct SamapProcess {
    python: PathBuf,
}

impl Default for SamapProcess {
    fn default() -> Self {
        SamapProcess::new(DEFAULT_PYTHON)
    }
}

impl SamapProcess {
    pub fn new(python: impl Into<PathBuf>) -> SamapProcess {
        SamapProcess { python: python.into() }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    pub fn command(&self, request: &IntegrationRequest, staging: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c")
            .arg(SAMAP_DRIVER)
            .arg(&request.species1)
            .arg(&request.data1)
            .arg(&request.species2)
            .arg(&request.data2)
            .arg(&request.maps)
            .arg(staging)
            .arg(if request.save_processed { "1" } else { "0" });
        cmd
    }
}

impl Integrator for SamapProcess {
    fn integrate(&self, request: &IntegrationRequest, staging: &Path) -> Result<(), Error> {
        let mut cmd = self.command(request, staging);
        debug!("running SAMap with {}", self.python.display());
        let status = cmd
            .status()
            .with_context(|| format!("could not start {}", self.python.display()))?;
        if !status.success() {
            bail!("SAMap failed ({})", status);
        }
        Ok(())
    }
}

/// Validate `request`, integrate into a hidden staging file next to the output and move it onto
/// the output path. Returns the output path. On failure no file is left behind.
pub fn run_integration(request: &IntegrationRequest, integrator: &impl Integrator) -> Result<PathBuf, Error> {
    request.validate()?;
    let out = request.output_path();

    info!("starting integration of {} and {}", request.species1, request.species2);
    info!("{} data: {}", request.species1, request.data1.display());
    info!("{} data: {}", request.species2, request.data2.display());
    info!("homology maps: {}", request.maps.display());
    if request.save_processed {
        info!("preprocessed inputs will be saved next to the data files");
    }

    let dir = request.output_dir();
    let name = out.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let prefix = format!(".{name}.");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".pkl");
    // created like any other file (0666 minus umask) rather than owner-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let staging = builder
        .tempfile_in(&dir)
        .with_context(|| format!("could not create staging file in {}", dir.display()))?
        .into_temp_path();

    info!("running pairwise integration");
    integrator.integrate(request, &staging)?;

    let written = staging.metadata().map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        bail!("integration finished without writing {}", staging.display());
    }

    staging
        .persist(&out)
        .map_err(|e| e.error)
        .with_context(|| format!("could not move result to {}", out.display()))?;
    info!("saved integrated object to {}", out.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::ffi::OsStr;
    use std::fs::{create_dir, read, read_dir, write};

    #[derive(Default)]
    struct FakeIntegrator {
        payload: Option<&'static [u8]>,
        calls: Cell<usize>,
    }

    impl Integrator for FakeIntegrator {
        fn integrate(&self, _request: &IntegrationRequest, staging: &Path) -> Result<(), Error> {
            self.calls.set(self.calls.get() + 1);
            match self.payload {
                Some(bytes) => Ok(write(staging, bytes)?),
                None => bail!("alignment diverged"),
            }
        }
    }

    fn request(root: &Path) -> IntegrationRequest {
        let inputs = root.join("inputs");
        create_dir(&inputs).unwrap();
        write(inputs.join("hs.h5ad"), b"hs").unwrap();
        write(inputs.join("mm.h5ad"), b"mm").unwrap();
        create_dir(inputs.join("maps")).unwrap();
        create_dir(root.join("out")).unwrap();
        IntegrationRequest {
            species1: "hs".to_string(),
            species2: "mm".to_string(),
            data1: inputs.join("hs.h5ad"),
            data2: inputs.join("mm.h5ad"),
            maps: inputs.join("maps"),
            out: root.join("out/hs_mm"),
            save_processed: false,
        }
    }

    fn output_files(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = read_dir(root.join("out")).unwrap().map(|e| e.unwrap().path()).collect();
        files.sort();
        files
    }

    #[test]
    fn test_single_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let fake = FakeIntegrator {
            payload: Some(b"pickled"),
            ..Default::default()
        };

        let out = run_integration(&req, &fake).unwrap();
        assert_eq!(out, dir.path().join("out/hs_mm.pkl"));
        assert_eq!(fake.calls.get(), 1);
        assert_eq!(output_files(dir.path()), vec![out.clone()]);
        assert_eq!(read(&out).unwrap(), b"pickled");
    }

    #[cfg(unix)]
    #[test]
    fn test_artifact_mode_follows_umask() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let fake = FakeIntegrator {
            payload: Some(b"pickled"),
            ..Default::default()
        };
        let out = run_integration(&req, &fake).unwrap();

        let plain = dir.path().join("out/plain.txt");
        write(&plain, b"plain").unwrap();
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&out), mode(&plain));
    }

    #[test]
    fn test_existing_output_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        write(dir.path().join("out/hs_mm.pkl"), b"stale").unwrap();

        let fake = FakeIntegrator {
            payload: Some(b"fresh"),
            ..Default::default()
        };
        let out = run_integration(&req, &fake).unwrap();
        assert_eq!(read(&out).unwrap(), b"fresh");
        assert_eq!(output_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_missing_maps_fail_before_integration() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path());
        req.maps = dir.path().join("inputs/no_maps");
        let fake = FakeIntegrator {
            payload: Some(b"pickled"),
            ..Default::default()
        };

        assert!(run_integration(&req, &fake).is_err());
        assert_eq!(fake.calls.get(), 0);
        assert!(output_files(dir.path()).is_empty());
    }

    #[test]
    fn test_failing_backend_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let fake = FakeIntegrator::default();

        let err = run_integration(&req, &fake).unwrap_err();
        assert!(err.to_string().contains("diverged"));
        assert_eq!(fake.calls.get(), 1);
        assert!(output_files(dir.path()).is_empty());
    }

    #[test]
    fn test_empty_result_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let fake = FakeIntegrator {
            payload: Some(b""),
            ..Default::default()
        };

        assert!(run_integration(&req, &fake).is_err());
        assert!(output_files(dir.path()).is_empty());
    }

    #[test]
    fn test_driver_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path());
        req.save_processed = true;
        let staging = dir.path().join("out/.hs_mm.pkl.x.pkl");

        let cmd = SamapProcess::new("/opt/samap/bin/python").command(&req, &staging);
        assert_eq!(cmd.get_program(), OsStr::new("/opt/samap/bin/python"));
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(args.len(), 9);
        assert_eq!(args[0], "-c");
        assert!(args[1].to_string_lossy().contains("save_samap"));
        assert_eq!(args[2], "hs");
        assert_eq!(args[3], req.data1.as_os_str());
        assert_eq!(args[4], "mm");
        assert_eq!(args[5], req.data2.as_os_str());
        assert_eq!(args[6], req.maps.as_os_str());
        assert_eq!(args[7], staging.as_os_str());
        assert_eq!(args[8], "1");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_failures_leave_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());

        // starts, but exits with an error
        assert!(run_integration(&req, &SamapProcess::new("false")).is_err());
        // succeeds without producing anything
        assert!(run_integration(&req, &SamapProcess::new("true")).is_err());
        // cannot start at all
        assert!(run_integration(&req, &SamapProcess::new(dir.path().join("no-python"))).is_err());

        assert!(output_files(dir.path()).is_empty());
    }
}
