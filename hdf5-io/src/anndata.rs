use anyhow::{bail, format_err, Context, Error};
use hdf5::types::{VarLenAscii, VarLenUnicode};
use ndarray::{arr1, s, Array1, Array2};
use sprs::CsMat;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Layer name that addresses the main matrix `/X` instead of `/layers/<name>`
pub const MAIN_MATRIX: &str = "X";

const DEFAULT_INDEX: &str = "_index";

/// Storage layout of an expression matrix inside an h5ad file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerEncoding {
    Dense,
    Csr,
    Csc,
}

impl LayerEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerEncoding::Dense => "array",
            LayerEncoding::Csr => "csr_matrix",
            LayerEncoding::Csc => "csc_matrix",
        }
    }
}

impl FromStr for LayerEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "array" => LayerEncoding::Dense,
            "csr_matrix" => LayerEncoding::Csr,
            "csc_matrix" => LayerEncoding::Csc,
            _ => bail!("unsupported matrix encoding-type '{}'", s),
        })
    }
}

fn layer_path(layer: &str) -> String {
    if layer == MAIN_MATRIX {
        MAIN_MATRIX.to_string()
    } else {
        format!("layers/{layer}")
    }
}

fn read_string_attr(loc: &hdf5::Location, name: &str) -> Result<String, Error> {
    let attr = loc.attr(name)?;
    match attr.read_scalar::<VarLenUnicode>() {
        Ok(v) => Ok(v.as_str().to_string()),
        Err(_) => Ok(attr.read_scalar::<VarLenAscii>()?.as_str().to_string()),
    }
}

fn read_strings(ds: &hdf5::Dataset) -> Result<Vec<String>, Error> {
    match ds.read_1d::<VarLenUnicode>() {
        Ok(v) => Ok(v.iter().map(|s| s.as_str().to_string()).collect()),
        Err(_) => Ok(ds
            .read_1d::<VarLenAscii>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()),
    }
}

fn to_usize(values: Vec<i64>, what: &str) -> Result<Vec<usize>, Error> {
    values
        .into_iter()
        .map(|v| usize::try_from(v).map_err(|_| format_err!("negative {} entry {}", what, v)))
        .collect()
}

/// Sort the minor indices of every outer slice; scipy does not guarantee sorted indices but
/// sprs requires them.
fn sort_outer_slices(indptr: &[usize], indices: &mut [usize], data: &mut [f64]) -> Result<(), Error> {
    if indices.len() != data.len() {
        bail!("indices ({}) and data ({}) differ in length", indices.len(), data.len());
    }
    if indptr.windows(2).any(|w| w[0] > w[1]) || indptr.last().copied().unwrap_or(0) != indices.len() {
        bail!("indptr is not a valid offset array for {} entries", indices.len());
    }

    for w in indptr.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        if indices[lo..hi].windows(2).all(|p| p[0] <= p[1]) {
            continue;
        }
        let mut pairs: Vec<(usize, f64)> = indices[lo..hi]
            .iter()
            .copied()
            .zip(data[lo..hi].iter().copied())
            .collect();
        pairs.sort_by_key(|p| p.0);
        for (i, (idx, val)) in pairs.into_iter().enumerate() {
            indices[lo + i] = idx;
            data[lo + i] = val;
        }
    }
    Ok(())
}

/// Densify columns `cols` of a cells x genes sparse matrix
fn sparse_columns(mat: &CsMat<f64>, cols: Range<usize>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((mat.rows(), cols.len()));
    if mat.is_csc() {
        for (j, col) in cols.enumerate() {
            if let Some(v) = mat.outer_view(col) {
                for (row, &val) in v.iter() {
                    out[(row, j)] += val;
                }
            }
        }
    } else {
        for (row, v) in mat.outer_iterator().enumerate() {
            for (col, &val) in v.iter() {
                if cols.contains(&col) {
                    out[(row, col - cols.start)] += val;
                }
            }
        }
    }
    out
}

/// Read access to an AnnData h5ad file
pub struct AnnData {
    file: hdf5::File,
    path: PathBuf,
}

impl AnnData {
    pub fn open(path: impl AsRef<Path>) -> Result<AnnData, Error> {
        let path = path.as_ref().to_path_buf();
        let file = hdf5::File::open(&path).with_context(|| path.display().to_string())?;
        Ok(AnnData { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn index_names(&self, group: &str) -> Result<Vec<String>, Error> {
        let g = self
            .file
            .group(group)
            .with_context(|| format!("{}: no /{} group", self.path.display(), group))?;
        let key = read_string_attr(&g, DEFAULT_INDEX).unwrap_or_else(|_| DEFAULT_INDEX.to_string());
        let ds = g
            .dataset(&key)
            .with_context(|| format!("{}: no index dataset /{}/{}", self.path.display(), group, key))?;
        read_strings(&ds).with_context(|| format!("{}: reading /{}/{}", self.path.display(), group, key))
    }

    /// cell barcodes, the obs index
    pub fn obs_names(&self) -> Result<Vec<String>, Error> {
        self.index_names("obs")
    }

    /// gene identifiers, the var index
    pub fn var_names(&self) -> Result<Vec<String>, Error> {
        self.index_names("var")
    }

    /// Read a numeric per-cell annotation from obs
    pub fn obs_column(&self, key: &str) -> Result<Array1<f64>, Error> {
        let obs = self
            .file
            .group("obs")
            .with_context(|| format!("{}: no /obs group", self.path.display()))?;
        if obs.group(key).is_ok() {
            bail!(
                "{}: obs column '{}' is encoded as a group (categorical?), expected a numeric column",
                self.path.display(),
                key
            );
        }
        let ds = obs
            .dataset(key)
            .with_context(|| format!("{}: obs has no column '{}'", self.path.display(), key))?;
        ds.read_1d::<f64>()
            .with_context(|| format!("{}: obs column '{}' is not numeric", self.path.display(), key))
    }

    pub fn layer_encoding(&self, layer: &str) -> Result<LayerEncoding, Error> {
        let path = layer_path(layer);
        if let Ok(group) = self.file.group(&path) {
            read_string_attr(&group, "encoding-type")
                .with_context(|| format!("{}: /{} has no encoding-type", self.path.display(), path))?
                .parse()
        } else if self.file.dataset(&path).is_ok() {
            Ok(LayerEncoding::Dense)
        } else {
            bail!("{}: layer '{}' not found (looked for /{})", self.path.display(), layer, path)
        }
    }

    /// (cells, genes) of a layer
    pub fn layer_shape(&self, layer: &str) -> Result<(usize, usize), Error> {
        let path = layer_path(layer);
        let shape = match self.layer_encoding(layer)? {
            LayerEncoding::Dense => self.file.dataset(&path)?.shape(),
            LayerEncoding::Csr | LayerEncoding::Csc => {
                let raw = self.file.group(&path)?.attr("shape")?.read_raw::<i64>()?;
                to_usize(raw, "shape")?
            }
        };
        match shape[..] {
            [n_obs, n_vars] => Ok((n_obs, n_vars)),
            _ => bail!("{}: /{} is not two-dimensional: {:?}", self.path.display(), path, shape),
        }
    }

    /// Read columns `cols` (gene indices) of a layer as a dense cells x genes array
    pub fn layer_columns(&self, layer: &str, cols: Range<usize>) -> Result<Array2<f64>, Error> {
        let path = layer_path(layer);
        let (n_obs, n_vars) = self.layer_shape(layer)?;
        if cols.start > cols.end || cols.end > n_vars {
            bail!(
                "{}: columns {}..{} out of range for layer '{}' with {} genes",
                self.path.display(),
                cols.start,
                cols.end,
                layer,
                n_vars
            );
        }

        if cols.is_empty() {
            return Ok(Array2::zeros((n_obs, 0)));
        }

        let encoding = self.layer_encoding(layer)?;
        if encoding == LayerEncoding::Dense {
            // hyperslab of the chunk's columns only
            return self
                .file
                .dataset(&path)?
                .read_slice_2d::<f64, _>(s![.., cols.clone()])
                .with_context(|| format!("{}: reading /{} columns {:?}", self.path.display(), path, cols));
        }

        let group = self.file.group(&path)?;
        let mut data = group.dataset("data")?.read_raw::<f64>()?;
        let mut indices = to_usize(group.dataset("indices")?.read_raw::<i64>()?, "indices")?;
        let indptr = to_usize(group.dataset("indptr")?.read_raw::<i64>()?, "indptr")?;
        sort_outer_slices(&indptr, &mut indices, &mut data)
            .with_context(|| format!("{}: malformed sparse layer /{}", self.path.display(), path))?;

        let shape = (n_obs, n_vars);
        let mat = if encoding == LayerEncoding::Csr {
            CsMat::try_new(shape, indptr, indices, data)
        } else {
            CsMat::try_new_csc(shape, indptr, indices, data)
        }
        .map_err(|(_, _, _, e)| format_err!("{}: malformed sparse layer /{}: {:?}", self.path.display(), path, e))?;

        Ok(sparse_columns(&mat, cols))
    }
}

/// Writes minimal h5ad files (index, numeric obs columns, layers); small fixtures for tests
/// and tooling.
#[derive(Clone, Debug, Default)]
pub struct H5adBuilder {
    obs_names: Vec<String>,
    var_names: Vec<String>,
    obs_columns: Vec<(String, Array1<f64>)>,
    layers: Vec<(String, LayerEncoding, Array2<f64>)>,
}

fn string_array(values: &[String]) -> Result<Array1<VarLenUnicode>, Error> {
    values
        .iter()
        .map(|v| VarLenUnicode::from_str(v).map_err(|e| format_err!("invalid string '{}': {:?}", v, e)))
        .collect::<Result<Vec<_>, _>>()
        .map(Array1::from)
}

fn write_string_attr(loc: &hdf5::Location, name: &str, value: &str) -> Result<(), Error> {
    let value = VarLenUnicode::from_str(value).map_err(|e| format_err!("invalid attribute '{}': {:?}", value, e))?;
    loc.new_attr::<VarLenUnicode>().shape(()).create(name)?.write_scalar(&value)?;
    Ok(())
}

impl H5adBuilder {
    pub fn new(obs_names: Vec<String>, var_names: Vec<String>) -> Self {
        H5adBuilder {
            obs_names,
            var_names,
            ..Default::default()
        }
    }

    pub fn obs_column(mut self, key: &str, values: Array1<f64>) -> Self {
        self.obs_columns.push((key.to_string(), values));
        self
    }

    /// Add a cells x genes layer; the name `X` writes the main matrix
    pub fn layer(mut self, name: &str, encoding: LayerEncoding, values: Array2<f64>) -> Self {
        self.layers.push((name.to_string(), encoding, values));
        self
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let file = hdf5::File::create(path).with_context(|| path.display().to_string())?;

        let obs = file.create_group("obs")?;
        write_string_attr(&obs, DEFAULT_INDEX, DEFAULT_INDEX)?;
        obs.new_dataset_builder()
            .with_data(&string_array(&self.obs_names)?)
            .create(DEFAULT_INDEX)?;
        for (key, values) in &self.obs_columns {
            obs.new_dataset_builder().with_data(values).create(key.as_str())?;
        }

        let var = file.create_group("var")?;
        write_string_attr(&var, DEFAULT_INDEX, DEFAULT_INDEX)?;
        var.new_dataset_builder()
            .with_data(&string_array(&self.var_names)?)
            .create(DEFAULT_INDEX)?;

        let layers = file.create_group("layers")?;
        for (name, encoding, values) in &self.layers {
            let (parent, leaf) = if name == MAIN_MATRIX {
                (&*file, name.as_str())
            } else {
                (&layers, name.as_str())
            };

            if *encoding == LayerEncoding::Dense {
                parent.new_dataset_builder().with_data(values).create(leaf)?;
                continue;
            }

            let mat = if *encoding == LayerEncoding::Csr {
                CsMat::csr_from_dense(values.view(), 0.0)
            } else {
                CsMat::csc_from_dense(values.view(), 0.0)
            };
            let group = parent.create_group(leaf)?;
            write_string_attr(&group, "encoding-type", encoding.as_str())?;
            write_string_attr(&group, "encoding-version", "0.1.0")?;
            let shape = arr1(&[values.nrows() as i64, values.ncols() as i64]);
            group.new_attr_builder().with_data(&shape).create("shape")?;

            let indptr: Array1<i64> = mat.indptr().raw_storage().iter().map(|&v| v as i64).collect();
            let indices: Array1<i32> = mat.indices().iter().map(|&v| v as i32).collect();
            let data = Array1::from(mat.data().to_vec());
            group.new_dataset_builder().with_data(&data).create("data")?;
            group.new_dataset_builder().with_data(&indices).create("indices")?;
            group.new_dataset_builder().with_data(&indptr).create("indptr")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn expression() -> Array2<f64> {
        array![
            [0.0, 1.5, 0.0, 2.0],
            [0.5, 0.0, 0.0, 0.0],
            [0.0, 0.0, 3.0, 1.0],
            [1.0, 2.5, 0.0, 0.0],
            [0.0, 0.0, 0.0, 4.0],
        ]
    }

    fn fixture(dir: &Path) -> PathBuf {
        let path = dir.join("fixture.h5ad");
        H5adBuilder::new(names("cell", 5), names("gene", 4))
            .obs_column("dpt_pseudotime", array![0.0, 0.25, 0.5, 0.75, 1.0])
            .layer("X", LayerEncoding::Dense, expression())
            .layer("dense", LayerEncoding::Dense, expression())
            .layer("csr", LayerEncoding::Csr, expression())
            .layer("csc", LayerEncoding::Csc, expression())
            .write(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_parse_encoding() {
        assert_eq!("csr_matrix".parse::<LayerEncoding>().unwrap(), LayerEncoding::Csr);
        assert_eq!("csc_matrix".parse::<LayerEncoding>().unwrap(), LayerEncoding::Csc);
        assert_eq!("array".parse::<LayerEncoding>().unwrap(), LayerEncoding::Dense);
        assert!("coo_matrix".parse::<LayerEncoding>().is_err());
    }

    #[test]
    fn test_sort_outer_slices() {
        let indptr = vec![0, 3, 3, 5];
        let mut indices = vec![2, 0, 1, 4, 3];
        let mut data = vec![20.0, 0.0, 10.0, 40.0, 30.0];
        sort_outer_slices(&indptr, &mut indices, &mut data).unwrap();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(data, vec![0.0, 10.0, 20.0, 30.0, 40.0]);

        let bad_indptr = vec![0, 4, 3];
        assert!(sort_outer_slices(&bad_indptr, &mut indices, &mut data).is_err());
    }

    #[test]
    fn test_read_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let adata = AnnData::open(fixture(dir.path())).unwrap();

        assert_eq!(adata.var_names().unwrap(), names("gene", 4));
        assert_eq!(adata.obs_names().unwrap(), names("cell", 5));
        assert_eq!(
            adata.obs_column("dpt_pseudotime").unwrap(),
            array![0.0, 0.25, 0.5, 0.75, 1.0]
        );
        assert!(adata.obs_column("missing").is_err());
    }

    #[test]
    fn test_layers_agree() {
        let dir = tempfile::tempdir().unwrap();
        let adata = AnnData::open(fixture(dir.path())).unwrap();
        let expected = expression();

        for layer in ["X", "dense", "csr", "csc"] {
            assert_eq!(adata.layer_shape(layer).unwrap(), (5, 4), "{layer}");
            assert_eq!(adata.layer_columns(layer, 0..4).unwrap(), expected, "{layer}");
            assert_eq!(
                adata.layer_columns(layer, 1..3).unwrap(),
                expected.slice(s![.., 1..3]).to_owned(),
                "{layer}"
            );
            assert_eq!(adata.layer_columns(layer, 2..2).unwrap().shape(), &[5, 0]);
        }

        assert_eq!(adata.layer_encoding("csr").unwrap(), LayerEncoding::Csr);
        assert_eq!(adata.layer_encoding("csc").unwrap(), LayerEncoding::Csc);
        assert_eq!(adata.layer_encoding("X").unwrap(), LayerEncoding::Dense);
    }

    #[test]
    fn test_dense_column_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.h5ad");
        let wide = Array2::from_shape_fn((7, 30), |(i, j)| (i * 100 + j) as f64);
        H5adBuilder::new(names("cell", 7), names("gene", 30))
            .layer("log1p", LayerEncoding::Dense, wide.clone())
            .write(&path)
            .unwrap();
        let adata = AnnData::open(&path).unwrap();

        for (start, end) in [(0, 1), (29, 30), (10, 20), (0, 30)] {
            let cols = adata.layer_columns("log1p", start..end).unwrap();
            assert_eq!(cols, wide.slice(s![.., start..end]).to_owned(), "{start}..{end}");
        }
    }

    #[test]
    fn test_layer_errors() {
        let dir = tempfile::tempdir().unwrap();
        let adata = AnnData::open(fixture(dir.path())).unwrap();

        assert!(adata.layer_columns("log1p", 0..1).is_err());
        assert!(adata.layer_columns("csr", 2..5).is_err());
        assert!(AnnData::open(dir.path().join("absent.h5ad")).is_err());
    }
}
