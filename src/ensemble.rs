//! Ensemble mean and sample standard deviation across member files.

use crate::dataset::Dataset;
use crate::error::Error;
use crate::field::Field;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder in a member file name that expands to the member number.
pub const MEMBER_PLACEHOLDER: char = '#';

/// Member file names generated from a `#` template.
#[derive(Debug, Clone)]
pub struct MemberTemplate {
    pattern: String,
    start: usize,
    count: usize,
    width: usize,
}

impl MemberTemplate {
    /// `width` 0 pads to the number of digits of `start + count`.
    pub fn new(pattern: &str, count: usize, start: usize, width: usize) -> Result<Self> {
        if count < 2 {
            return Err(Error::usage(format!(
                "an ensemble needs more than one member (got {count})"
            ))
            .into());
        }
        if !pattern.contains(MEMBER_PLACEHOLDER) {
            return Err(Error::usage(format!(
                "member file name '{pattern}' must contain '{MEMBER_PLACEHOLDER}', which expands to the member number"
            ))
            .into());
        }
        let width = if width > 0 {
            width
        } else {
            (start + count).to_string().len()
        };
        Ok(Self {
            pattern: pattern.to_string(),
            start,
            count,
            width,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn member_path(&self, n: usize) -> PathBuf {
        let number = format!("{:0width$}", n, width = self.width);
        PathBuf::from(self.pattern.replace(MEMBER_PLACEHOLDER, &number))
    }

    pub fn members(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (self.start..self.start + self.count).map(|n| self.member_path(n))
    }
}

/// Ensemble statistics of one variable.
#[derive(Debug, Clone)]
pub struct EnsembleStats {
    pub variable: String,
    /// Named `<variable>_mean`.
    pub mean: Field,
    /// Named `<variable>_std`; divides by `n - 1`.
    pub std: Field,
}

/// Two passes over the members: the mean first, then squared deviations from it.
///
/// Variables are those of the first member, except `time` and `exclude`, in
/// the first member's order.
pub async fn ensemble_mean_std(
    template: &MemberTemplate,
    exclude: &[String],
) -> Result<Vec<EnsembleStats>> {
    let first_path = template.member_path(template.start);
    let first = Dataset::open(&first_path).await?;
    let mut sums = Vec::new();
    for v in first.variable_names() {
        if v == "time" || exclude.iter().any(|e| e == v) {
            continue;
        }
        sums.push(first.read_field(v)?.filled_like(0.0));
    }
    if sums.is_empty() {
        return Err(Error::usage(format!(
            "'{}' has no variables left to process",
            first_path.display()
        ))
        .into());
    }
    drop(first);

    let n = template.count() as f64;

    for path in template.members() {
        println!("updating means with ens member {}", path.display());
        let ds = Dataset::open(&path).await?;
        for acc in sums.iter_mut() {
            let member = read_member(&ds, &path, acc)?;
            for (a, v) in acc.data_mut().iter_mut().zip(member.data()) {
                *a += v;
            }
        }
    }

    info!("dividing means by {}", template.count());
    let mut means = sums;
    for m in means.iter_mut() {
        m.data_mut().iter_mut().for_each(|x| *x /= n);
    }

    let mut squares: Vec<Field> = means.iter().map(|m| m.filled_like(0.0)).collect();
    for path in template.members() {
        println!("updating std devs with ens member {}", path.display());
        let ds = Dataset::open(&path).await?;
        for (acc, mean) in squares.iter_mut().zip(&means) {
            let member = read_member(&ds, &path, acc)?;
            let deviations = member.data().iter().zip(mean.data());
            for (a, (v, m)) in acc.data_mut().iter_mut().zip(deviations) {
                *a += (v - m) * (v - m);
            }
        }
    }

    info!(
        "dividing stds by {} and taking square root",
        template.count() - 1
    );
    Ok(squares
        .into_iter()
        .zip(means)
        .map(|(mut sq, mean)| {
            sq.data_mut()
                .iter_mut()
                .for_each(|s| *s = (*s / (n - 1.0)).sqrt());
            let variable = mean.name().to_string();
            EnsembleStats {
                std: sq.with_name(format!("{variable}_std")),
                mean: mean.with_name(format!("{variable}_mean")),
                variable,
            }
        })
        .collect())
}

/// Read the member's copy of `like`, which must exist with the same shape.
fn read_member(ds: &Dataset, path: &Path, like: &Field) -> Result<Field> {
    if !ds.has_variable(like.name()) {
        return Err(Error::MissingEnsembleVariable {
            file: path.to_path_buf(),
            variable: like.name().to_string(),
        }
        .into());
    }
    debug!("  updating {}", like.name());
    let f = ds
        .read_field(like.name())
        .with_context(|| format!("ensemble member {}", path.display()))?;
    if f.shape() != like.shape() {
        return Err(Error::schema(format!(
            "'{}' in '{}' has shape {:?}, expected {:?}",
            like.name(),
            path.display(),
            f.shape(),
            like.shape()
        ))
        .into());
    }
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Attributes;
    use crate::writer::{ArrayData, StoreWriter};
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn write_member(dir: &Path, n: usize, ts: Vec<f64>, with_ps: bool) {
        let mut w = StoreWriter::create(dir.join(format!("run.{n:02}.zarr")), false).unwrap();
        let dims = vec!["time".to_string(), "ncol".to_string()];
        w.write_array("TS", &dims, &[1, 2], ArrayData::F64(ts), Attributes::new())
            .unwrap();
        w.write_array(
            "time",
            &["time".to_string()],
            &[1],
            ArrayData::F64(vec![0.0]),
            Attributes::new(),
        )
        .unwrap();
        if with_ps {
            w.write_array(
                "PS",
                &["ncol".to_string()],
                &[2],
                ArrayData::F64(vec![1.0, 1.0]),
                Attributes::new(),
            )
            .unwrap();
        }
        w.finish().unwrap();
    }

    #[test]
    fn test_member_names() {
        let t = MemberTemplate::new("run.#.nc", 3, 1, 0).unwrap();
        let names: Vec<PathBuf> = t.members().collect();
        assert_eq!(names, vec![
            PathBuf::from("run.1.nc"),
            PathBuf::from("run.2.nc"),
            PathBuf::from("run.3.nc"),
        ]);
        let t = MemberTemplate::new("run.#.nc", 2, 9, 0).unwrap();
        assert_eq!(t.member_path(9), PathBuf::from("run.09.nc"));
        let t = MemberTemplate::new("ens#/h0.nc", 2, 1, 3).unwrap();
        assert_eq!(t.member_path(2), PathBuf::from("ens002/h0.nc"));

        assert!(MemberTemplate::new("run.#.nc", 1, 1, 0).is_err());
        assert!(MemberTemplate::new("run.nc", 3, 1, 0).is_err());
    }

    #[tokio::test]
    async fn test_sample_mean_and_std() {
        let temp = TempDir::new().unwrap();
        write_member(temp.path(), 1, vec![1.0, 10.0], true);
        write_member(temp.path(), 2, vec![2.0, 10.0], true);
        write_member(temp.path(), 3, vec![6.0, 10.0], true);

        let pattern = temp.path().join("run.#.zarr");
        let t = MemberTemplate::new(&pattern.to_string_lossy(), 3, 1, 2).unwrap();
        let stats = ensemble_mean_std(&t, &["PS".to_string()]).await.unwrap();

        assert_eq!(stats.len(), 1);
        let ts = &stats[0];
        assert_eq!(ts.variable, "TS");
        assert_eq!(ts.mean.name(), "TS_mean");
        assert_eq!(ts.std.dims(), &["time".to_string(), "ncol".to_string()]);
        assert_relative_eq!(ts.mean.data()[0], 3.0);
        // deviations -2, -1, 3 -> 14 / (3 - 1)
        assert_relative_eq!(ts.std.data()[0], 7.0f64.sqrt());
        assert_relative_eq!(ts.std.data()[1], 0.0);
    }

    #[tokio::test]
    async fn test_missing_variable_names_member() {
        let temp = TempDir::new().unwrap();
        write_member(temp.path(), 1, vec![1.0, 1.0], true);
        write_member(temp.path(), 2, vec![1.0, 1.0], false);

        let pattern = temp.path().join("run.#.zarr");
        let t = MemberTemplate::new(&pattern.to_string_lossy(), 2, 1, 2).unwrap();
        let err = ensemble_mean_std(&t, &[]).await.unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::MissingEnsembleVariable { file, variable }) => {
                assert_eq!(variable, "PS");
                assert!(file.ends_with("run.02.zarr"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
