use calmform::{FieldLens, FormController, FormModel, FormOptions, IntoFieldPath};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, calmform::FormModel)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub email: String,
    pub display_name: String,
    #[serde(rename = "years")]
    pub age: u32,
    #[serde(skip)]
    pub scratch: String,
}

fn main() {
    let fields = SignupForm::fields();
    assert_eq!(fields.email().name(), "email");
    assert_eq!(fields.display_name().name(), "displayName");
    assert_eq!(fields.age().name(), "years");
    assert_eq!(
        fields.age().into_field_path().map(|path| path.to_string()),
        Ok("years".to_string())
    );

    let model = SignupForm {
        email: "a@calm.form".to_string(),
        display_name: "Ada".to_string(),
        age: 36,
        scratch: String::new(),
    };
    let form = FormController::from_model(&model, FormOptions::default()).expect("form from model");
    form.set_field(fields.age(), 37).expect("set age");
    assert_eq!(form.field_value(fields.age()), Ok(Some(37)));
    assert_eq!(
        form.model::<SignupForm>().map(|model| model.age),
        Ok(37)
    );
}
